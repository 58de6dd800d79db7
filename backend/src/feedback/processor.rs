use image::DynamicImage;
use shared::InsightsSummary;

use crate::db::models::now;
use crate::db::{
    ContributionRecord, ContributionStore, FeedbackRecord, FeedbackStore, GeoLocation,
    NewContribution, NewFeedback, PredictionStore, StoreError,
};
use crate::insights::InsightsAggregator;
use crate::preprocess::{ImagePreprocessor, PreprocessError};
use crate::service::UploadedImage;
use crate::storage::{ImageStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("Contributed image is not a readable image: {0}")]
    InvalidImage(#[source] PreprocessError),
    #[error("Could not store contributed image: {0}")]
    Storage(#[from] StorageError),
    #[error("Could not record feedback: {0}")]
    Store(#[from] StoreError),
}

/// A user's verdict on a diagnosis they were shown.
#[derive(Debug, Clone, Default)]
pub struct FeedbackSubmission {
    /// Label reported by the earlier prediction, used to find it again.
    pub original_label: String,
    pub original_confidence: f32,
    pub is_correct: bool,
    pub corrected_label: Option<String>,
    pub contribute: bool,
    pub image: Option<UploadedImage>,
    pub location: GeoLocation,
}

impl FeedbackSubmission {
    /// Label the contributed image is filed under.
    pub fn asserted_label(&self) -> &str {
        match self.corrected_label.as_deref() {
            Some(label) if !self.is_correct && !label.is_empty() => label,
            _ => &self.original_label,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackReceipt {
    pub feedback: FeedbackRecord,
    pub contribution: Option<ContributionRecord>,
    pub insights: InsightsSummary,
}

#[derive(Clone)]
pub struct FeedbackProcessor {
    predictions: PredictionStore,
    feedback: FeedbackStore,
    contributions: ContributionStore,
    contribution_images: ImageStore,
    insights: InsightsAggregator,
}

impl FeedbackProcessor {
    pub fn new(
        predictions: PredictionStore,
        feedback: FeedbackStore,
        contributions: ContributionStore,
        contribution_images: ImageStore,
        insights: InsightsAggregator,
    ) -> Self {
        Self {
            predictions,
            feedback,
            contributions,
            contribution_images,
            insights,
        }
    }

    /// Records the contribution (if requested) and the feedback as two
    /// separate inserts, then returns freshly aggregated insights.
    ///
    /// Feedback attaches to the newest prediction carrying the original label.
    /// Concurrent submissions of the same label can therefore attach to each
    /// other's prediction.
    pub fn submit(
        &self,
        submission: &FeedbackSubmission,
        contributor: &str,
    ) -> Result<FeedbackReceipt, FeedbackError> {
        let contribution = match (&submission.image, submission.contribute) {
            (Some(image), true) if !image.bytes.is_empty() => {
                Some(self.store_contribution(submission, image, contributor)?)
            }
            _ => None,
        };

        let prediction = self.predictions.latest_with_label(&submission.original_label)?;
        if prediction.is_none() {
            log::warn!(
                "No prediction labeled {} found, storing unlinked feedback",
                submission.original_label
            );
        }
        let feedback = self.feedback.append(&NewFeedback::new(
            prediction.map(|p| p.id),
            submission.is_correct,
            submission.corrected_label.clone(),
        ))?;
        log::info!(
            "Feedback {} on {} ({:.3}): correct={}",
            feedback.id,
            submission.original_label,
            submission.original_confidence,
            feedback.is_correct
        );

        Ok(FeedbackReceipt {
            feedback,
            contribution,
            insights: self.insights.compute(),
        })
    }

    fn store_contribution(
        &self,
        submission: &FeedbackSubmission,
        image: &UploadedImage,
        contributor: &str,
    ) -> Result<ContributionRecord, FeedbackError> {
        let decoded = ImagePreprocessor::decode(&image.bytes).map_err(FeedbackError::InvalidImage)?;
        let label = submission.asserted_label();
        let stored = self.contribution_images.save_jpeg(
            &ImageStore::contribution_name(now(), label),
            &DynamicImage::ImageRgb8(decoded),
        )?;

        let record = self.contributions.append(&NewContribution {
            image_path: stored.public_path.clone(),
            label: label.to_string(),
            contributor: contributor.to_string(),
            location: submission.location.clone(),
        });
        match record {
            Ok(record) => Ok(record),
            Err(e) => {
                self.contribution_images.discard(&stored);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewPrediction};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::tempdir;

    struct Fixture {
        db: Database,
        processor: FeedbackProcessor,
    }

    fn fixture(root: &Path) -> Fixture {
        let db = Database::open(root.join("db").join("crop_disease.db")).unwrap();
        let predictions = PredictionStore::new(db.clone());
        let contributions = ContributionStore::new(db.clone());
        let processor = FeedbackProcessor::new(
            predictions.clone(),
            FeedbackStore::new(db.clone()),
            contributions.clone(),
            ImageStore::open(root.join("contributions"), "/static/contributions").unwrap(),
            InsightsAggregator::new(predictions, contributions),
        );
        Fixture { db, processor }
    }

    fn leaf_png() -> UploadedImage {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 9, Rgb([40, 160, 40])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        UploadedImage {
            file_name: "leaf.png".into(),
            bytes,
        }
    }

    #[test]
    fn incorrect_feedback_links_latest_matching_prediction() {
        let temp = tempdir().unwrap();
        let Fixture { db, processor } = fixture(temp.path());
        let predictions = PredictionStore::new(db.clone());
        predictions.append(&NewPrediction::new("/1.jpg", "A", 0.9)).unwrap();
        let latest = predictions.append(&NewPrediction::new("/2.jpg", "A", 0.8)).unwrap();
        predictions.append(&NewPrediction::new("/3.jpg", "C", 0.8)).unwrap();

        let receipt = processor
            .submit(
                &FeedbackSubmission {
                    original_label: "A".into(),
                    original_confidence: 0.8,
                    is_correct: false,
                    corrected_label: Some("B".into()),
                    ..Default::default()
                },
                "127.0.0.1",
            )
            .unwrap();

        assert_eq!(receipt.feedback.prediction_id, Some(latest.id));
        assert_eq!(receipt.feedback.corrected_label.as_deref(), Some("B"));
        assert!(receipt.contribution.is_none());
        let stored = FeedbackStore::new(db).for_prediction(latest.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].corrected_label.as_deref(), Some("B"));
        assert_eq!(receipt.insights.region_diseases[0].name, "A");
    }

    #[test]
    fn contribution_creates_one_unverified_record() {
        let temp = tempdir().unwrap();
        let Fixture { db, processor } = fixture(temp.path());
        PredictionStore::new(db.clone())
            .append(&NewPrediction::new("/1.jpg", "Tomato__early_blight", 0.55))
            .unwrap();

        let receipt = processor
            .submit(
                &FeedbackSubmission {
                    original_label: "Tomato__early_blight".into(),
                    original_confidence: 0.55,
                    is_correct: false,
                    corrected_label: Some("Tomato__late_blight".into()),
                    contribute: true,
                    image: Some(leaf_png()),
                    location: GeoLocation {
                        name: Some("Nashik".into()),
                        latitude: Some(19.99),
                        longitude: Some(73.79),
                    },
                },
                "192.168.1.7",
            )
            .unwrap();

        let contributions = ContributionStore::new(db);
        assert_eq!(contributions.count().unwrap(), 1);
        let record = receipt.contribution.unwrap();
        assert!(!record.verified);
        assert_eq!(record.label, "Tomato__late_blight");
        assert_eq!(record.contributor, "192.168.1.7");
        assert_eq!(record.location.latitude, Some(19.99));
        assert!(record.image_path.starts_with("/static/contributions/contribution_"));
        assert!(record.image_path.contains("_Tomato__late_blight_"));

        let files: Vec<_> = std::fs::read_dir(temp.path().join("contributions")).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(receipt.insights.recent_submissions.is_empty());
    }

    #[test]
    fn image_without_contribution_flag_is_not_stored() {
        let temp = tempdir().unwrap();
        let Fixture { db, processor } = fixture(temp.path());
        processor
            .submit(
                &FeedbackSubmission {
                    original_label: "A".into(),
                    is_correct: true,
                    image: Some(leaf_png()),
                    ..Default::default()
                },
                "127.0.0.1",
            )
            .unwrap();
        assert_eq!(ContributionStore::new(db).count().unwrap(), 0);
        assert_eq!(std::fs::read_dir(temp.path().join("contributions")).unwrap().count(), 0);
    }

    #[test]
    fn empty_contributed_image_is_ignored() {
        let temp = tempdir().unwrap();
        let Fixture { db, processor } = fixture(temp.path());
        let receipt = processor
            .submit(
                &FeedbackSubmission {
                    original_label: "A".into(),
                    is_correct: true,
                    contribute: true,
                    image: Some(UploadedImage::default()),
                    ..Default::default()
                },
                "127.0.0.1",
            )
            .unwrap();
        assert!(receipt.contribution.is_none());
        assert_eq!(ContributionStore::new(db.clone()).count().unwrap(), 0);
        assert_eq!(FeedbackStore::new(db).count().unwrap(), 1);
    }

    #[test]
    fn confirmed_prediction_contributes_under_original_label() {
        let submission = FeedbackSubmission {
            original_label: "Potato__healthy".into(),
            is_correct: true,
            corrected_label: Some("ignored".into()),
            ..Default::default()
        };
        assert_eq!(submission.asserted_label(), "Potato__healthy");
    }

    #[test]
    fn unmatched_feedback_is_stored_unlinked() {
        let temp = tempdir().unwrap();
        let Fixture { db, processor } = fixture(temp.path());
        let receipt = processor
            .submit(
                &FeedbackSubmission {
                    original_label: "Nothing__like_this".into(),
                    is_correct: true,
                    ..Default::default()
                },
                "127.0.0.1",
            )
            .unwrap();
        assert_eq!(receipt.feedback.prediction_id, None);
        assert_eq!(FeedbackStore::new(db).count().unwrap(), 1);
    }

    #[test]
    fn undecodable_contribution_fails_without_writes() {
        let temp = tempdir().unwrap();
        let Fixture { db, processor } = fixture(temp.path());
        let err = processor
            .submit(
                &FeedbackSubmission {
                    original_label: "A".into(),
                    contribute: true,
                    image: Some(UploadedImage {
                        file_name: "leaf.jpg".into(),
                        bytes: b"not an image".to_vec(),
                    }),
                    ..Default::default()
                },
                "127.0.0.1",
            )
            .unwrap_err();
        assert!(matches!(err, FeedbackError::InvalidImage(_)));
        assert_eq!(FeedbackStore::new(db.clone()).count().unwrap(), 0);
        assert_eq!(ContributionStore::new(db).count().unwrap(), 0);
    }

    #[test]
    fn failed_contribution_insert_removes_saved_file() {
        let temp = tempdir().unwrap();
        let Fixture { db, processor } = fixture(temp.path());
        db.with_connection(|conn| conn.execute_batch("DROP TABLE contributions;"))
            .unwrap();

        let err = processor
            .submit(
                &FeedbackSubmission {
                    original_label: "A".into(),
                    contribute: true,
                    image: Some(leaf_png()),
                    ..Default::default()
                },
                "127.0.0.1",
            )
            .unwrap_err();
        assert!(matches!(err, FeedbackError::Store(_)));
        assert_eq!(std::fs::read_dir(temp.path().join("contributions")).unwrap().count(), 0);
    }
}
