use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};

use super::models::{LabelCount, NewPrediction, PredictionRecord, encode_timestamp, now};
use super::{Database, StoreError};

/// Append-only log of classification results.
#[derive(Clone)]
pub struct PredictionStore {
    db: Database,
}

impl PredictionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a record and returns it with its assigned id and timestamp.
    ///
    /// Timestamps strictly increase with insertion order: if the clock has not
    /// moved past the newest row, the new row is stamped one microsecond later.
    pub fn append(&self, prediction: &NewPrediction) -> Result<PredictionRecord, StoreError> {
        let confidence = prediction.confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(StoreError::InvalidConfidence(confidence));
        }

        let record = self.db.with_connection(|conn| {
            let latest: Option<String> = conn
                .query_row(
                    "SELECT timestamp FROM predictions ORDER BY id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let mut created_at = now();
            if let Some(latest) = latest.and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok()) {
                let latest = latest.with_timezone(&Utc);
                if created_at <= latest {
                    created_at = latest + Duration::microseconds(1);
                }
            }

            let location = &prediction.location;
            conn.prepare_cached(
                "INSERT INTO predictions (
                    image_path, prediction, confidence, timestamp,
                    location_name, latitude, longitude
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?
            .execute(params![
                prediction.image_path,
                prediction.label,
                confidence as f64,
                encode_timestamp(created_at),
                location.name,
                location.latitude,
                location.longitude,
            ])?;

            Ok(PredictionRecord {
                id: conn.last_insert_rowid(),
                image_path: prediction.image_path.clone(),
                label: prediction.label.clone(),
                confidence,
                created_at,
                location: location.clone(),
            })
        })?;
        log::debug!(
            "Logged prediction {} ({} @ {:.3})",
            record.id,
            record.label,
            record.confidence
        );
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Result<PredictionRecord, StoreError> {
        self.db
            .with_connection(|conn| {
                conn.query_row(
                    &format!("SELECT {} FROM predictions WHERE id = ?1", PredictionRecord::COLUMNS),
                    params![id],
                    PredictionRecord::from_row,
                )
                .optional()
            })?
            .ok_or(StoreError::NotFound(id))
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))
        })
    }

    /// Most recently inserted record carrying exactly `label`.
    pub fn latest_with_label(&self, label: &str) -> Result<Option<PredictionRecord>, StoreError> {
        self.db.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM predictions WHERE prediction = ?1 ORDER BY id DESC LIMIT 1",
                    PredictionRecord::COLUMNS
                ),
                params![label],
                PredictionRecord::from_row,
            )
            .optional()
        })
    }

    /// The `n` most frequent labels with their counts; equal counts order by label.
    pub fn top_k(&self, n: usize) -> Result<Vec<LabelCount>, StoreError> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT prediction, COUNT(*) AS count
                 FROM predictions
                 GROUP BY prediction
                 ORDER BY count DESC, prediction ASC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![n as i64], |row| {
                Ok(LabelCount {
                    label: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }
}
