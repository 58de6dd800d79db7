use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};

/// Optional place a photo was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoLocation {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.latitude.is_none() && self.longitude.is_none()
    }

    fn from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(first)?,
            latitude: row.get(first + 1)?,
            longitude: row.get(first + 2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub image_path: String,
    pub label: String,
    pub confidence: f32,
    pub location: GeoLocation,
}

impl NewPrediction {
    pub fn new(image_path: &str, label: &str, confidence: f32) -> Self {
        Self {
            image_path: image_path.to_string(),
            label: label.to_string(),
            confidence,
            location: GeoLocation::default(),
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = location;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub image_path: String,
    pub label: String,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub location: GeoLocation,
}

impl PredictionRecord {
    pub(super) const COLUMNS: &'static str =
        "id, image_path, prediction, confidence, timestamp, location_name, latitude, longitude";

    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            image_path: row.get(1)?,
            label: row.get(2)?,
            confidence: row.get::<_, f64>(3)? as f32,
            created_at: decode_timestamp(row, 4)?,
            location: GeoLocation::from_row(row, 5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub prediction_id: Option<i64>,
    pub is_correct: bool,
    pub corrected_label: Option<String>,
}

impl NewFeedback {
    /// A corrected label is only kept when the prediction was marked incorrect.
    pub fn new(prediction_id: Option<i64>, is_correct: bool, corrected_label: Option<String>) -> Self {
        Self {
            prediction_id,
            is_correct,
            corrected_label: if is_correct { None } else { corrected_label },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub prediction_id: Option<i64>,
    pub is_correct: bool,
    pub corrected_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub(super) const COLUMNS: &'static str =
        "id, prediction_id, is_correct, corrected_disease, timestamp";

    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            prediction_id: row.get(1)?,
            is_correct: row.get(2)?,
            corrected_label: row.get(3)?,
            created_at: decode_timestamp(row, 4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewContribution {
    pub image_path: String,
    pub label: String,
    pub contributor: String,
    pub location: GeoLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionRecord {
    pub id: i64,
    pub image_path: String,
    pub label: String,
    pub contributor: String,
    pub created_at: DateTime<Utc>,
    pub location: GeoLocation,
    pub verified: bool,
}

impl ContributionRecord {
    pub(super) const COLUMNS: &'static str = "id, image_path, disease, contributor_identifier, \
         timestamp, location_name, latitude, longitude, verified";

    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            image_path: row.get(1)?,
            label: row.get(2)?,
            contributor: row.get(3)?,
            created_at: decode_timestamp(row, 4)?,
            location: GeoLocation::from_row(row, 5)?,
            verified: row.get(8)?,
        })
    }
}

/// Label with its number of occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

/// Current time at the microsecond precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width UTC text, so lexical order equals chronological order.
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let a = DateTime::parse_from_rfc3339("2026-01-01T09:00:00.5Z").unwrap().with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2026-01-01T09:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let c = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let mut encoded = vec![encode_timestamp(c), encode_timestamp(a), encode_timestamp(b)];
        encoded.sort();
        assert_eq!(encoded, vec![encode_timestamp(b), encode_timestamp(a), encode_timestamp(c)]);
        assert_eq!(encode_timestamp(a), "2026-01-01T09:00:00.500000Z");
    }

    #[test]
    fn correct_feedback_drops_corrected_label() {
        let feedback = NewFeedback::new(Some(1), true, Some("B".into()));
        assert_eq!(feedback.corrected_label, None);
        let feedback = NewFeedback::new(Some(1), false, Some("B".into()));
        assert_eq!(feedback.corrected_label.as_deref(), Some("B"));
    }
}
