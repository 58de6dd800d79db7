use rusqlite::params;

use super::models::{FeedbackRecord, NewFeedback, encode_timestamp, now};
use super::{Database, StoreError};

/// Append-only log of user verdicts on earlier predictions.
#[derive(Clone)]
pub struct FeedbackStore {
    db: Database,
}

impl FeedbackStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append(&self, feedback: &NewFeedback) -> Result<FeedbackRecord, StoreError> {
        let created_at = now();
        let record = self.db.with_connection(|conn| {
            conn.prepare_cached(
                "INSERT INTO feedback (prediction_id, is_correct, corrected_disease, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                feedback.prediction_id,
                feedback.is_correct,
                feedback.corrected_label,
                encode_timestamp(created_at),
            ])?;
            Ok(FeedbackRecord {
                id: conn.last_insert_rowid(),
                prediction_id: feedback.prediction_id,
                is_correct: feedback.is_correct,
                corrected_label: feedback.corrected_label.clone(),
                created_at,
            })
        })?;
        log::debug!(
            "Recorded feedback {} for prediction {:?} (correct: {})",
            record.id,
            record.prediction_id,
            record.is_correct
        );
        Ok(record)
    }

    pub fn for_prediction(&self, prediction_id: i64) -> Result<Vec<FeedbackRecord>, StoreError> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM feedback WHERE prediction_id = ?1 ORDER BY id",
                FeedbackRecord::COLUMNS
            ))?;
            let rows = stmt.query_map(params![prediction_id], FeedbackRecord::from_row)?;
            rows.collect()
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM feedback", [], |row| row.get(0))
        })
    }
}
