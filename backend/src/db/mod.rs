pub mod contribution_store;
pub mod feedback_store;
pub mod models;
pub mod prediction_store;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub use contribution_store::ContributionStore;
pub use feedback_store::FeedbackStore;
pub use models::{
    ContributionRecord, FeedbackRecord, GeoLocation, LabelCount, NewContribution, NewFeedback,
    NewPrediction, PredictionRecord,
};
pub use prediction_store::PredictionStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("Could not create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Database is busy, please retry")]
    Busy,
    #[error("Database connection lock poisoned")]
    Poisoned,
    #[error("Confidence {0} is outside [0, 1]")]
    InvalidConfidence(f32),
    #[error("Record {0} not found")]
    NotFound(i64),
}

/// Shared handle to the SQLite file backing the three append-only relations.
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let connection = Connection::open(path).map_err(map_sql_error)?;
        schema::apply_pragmas(&connection).map_err(map_sql_error)?;
        Self::init(connection)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(map_sql_error)?;
        Self::init(connection)
    }

    fn init(connection: Connection) -> Result<Self, StoreError> {
        schema::apply_schema(&connection).map_err(map_sql_error)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs `f` while holding the connection. Each call is its own implicit transaction.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let connection = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        f(&connection).map_err(map_sql_error)
    }
}

/// Translate rusqlite errors into friendlier StoreError variants.
fn map_sql_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.code == rusqlite::ErrorCode::DatabaseBusy =>
        {
            StoreError::Busy
        }
        other => StoreError::Sql(other),
    }
}
