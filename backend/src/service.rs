use std::sync::Arc;

use shared::{DiagnosisResult, FeedbackResponse, InsightsSummary, PredictResponse};

use crate::config::AppConfig;
use crate::db::{ContributionStore, Database, FeedbackStore, GeoLocation, NewPrediction, PredictionStore};
use crate::feedback::{FeedbackError, FeedbackProcessor, FeedbackSubmission};
use crate::insights::InsightsAggregator;
use crate::model::{ClassMapping, Classifier, ClassifierError, DiseaseCatalog, Ranking, rank};
use crate::preprocess::{ImagePreprocessor, PreprocessError, PreprocessOptions};
use crate::storage::image_store::file_extension;
use crate::storage::{ImageStore, StorageError};

/// Failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidImage,
    MissingInput,
    UnsupportedFileType,
    PersistenceFailure,
    AggregationFailure,
    ClassifierFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("No file provided")]
    MissingInput,
    #[error("Invalid file type. Please upload an image ({allowed}).")]
    UnsupportedFileType { allowed: String },
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("Could not store upload: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Feedback(#[from] FeedbackError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::MissingInput => ErrorKind::MissingInput,
            ServiceError::UnsupportedFileType { .. } => ErrorKind::UnsupportedFileType,
            ServiceError::Preprocess(PreprocessError::InvalidImage(_)) => ErrorKind::InvalidImage,
            ServiceError::Preprocess(PreprocessError::Storage(_)) => ErrorKind::PersistenceFailure,
            ServiceError::Storage(_) => ErrorKind::PersistenceFailure,
            ServiceError::Classifier(_) => ErrorKind::ClassifierFailure,
            ServiceError::Feedback(FeedbackError::InvalidImage(_)) => ErrorKind::InvalidImage,
            ServiceError::Feedback(_) => ErrorKind::PersistenceFailure,
        }
    }

    /// Caller errors are reported as bad requests; nothing was written for them.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidImage | ErrorKind::MissingInput | ErrorKind::UnsupportedFileType
        )
    }
}

/// A file received from a client.
#[derive(Debug, Clone, Default)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Per-request inputs of a diagnosis besides the image itself.
#[derive(Debug, Clone, Default)]
pub struct PredictRequest {
    pub options: PreprocessOptions,
    pub language: String,
    pub location: GeoLocation,
}

/// Orchestrates classification and feedback over the shared stores.
#[derive(Clone)]
pub struct DiagnosisService {
    classifier: Arc<dyn Classifier>,
    preprocessor: ImagePreprocessor,
    uploads: ImageStore,
    predictions: PredictionStore,
    mapping: Arc<ClassMapping>,
    catalog: Arc<DiseaseCatalog>,
    allowed_extensions: Arc<Vec<String>>,
    feedback: FeedbackProcessor,
    insights: InsightsAggregator,
}

impl DiagnosisService {
    pub fn new(
        config: &AppConfig,
        db: Database,
        classifier: Arc<dyn Classifier>,
        mapping: ClassMapping,
        catalog: DiseaseCatalog,
    ) -> Result<Self, StorageError> {
        let uploads = ImageStore::open(&config.upload_folder, &AppConfig::public_prefix(&config.upload_folder))?;
        let processed = ImageStore::open(
            &config.processed_folder,
            &AppConfig::public_prefix(&config.processed_folder),
        )?;
        let contribution_images = ImageStore::open(
            &config.contributions_folder,
            &AppConfig::public_prefix(&config.contributions_folder),
        )?;

        let predictions = PredictionStore::new(db.clone());
        let contributions = ContributionStore::new(db.clone());
        let insights = InsightsAggregator::new(predictions.clone(), contributions.clone());
        let feedback = FeedbackProcessor::new(
            predictions.clone(),
            FeedbackStore::new(db),
            contributions,
            contribution_images,
            insights.clone(),
        );

        Ok(Self {
            classifier,
            preprocessor: ImagePreprocessor::new(processed),
            uploads,
            predictions,
            mapping: Arc::new(mapping),
            catalog: Arc::new(catalog),
            allowed_extensions: Arc::new(config.allowed_extensions.clone()),
            feedback,
            insights,
        })
    }

    pub fn classifier_version(&self) -> &str {
        self.classifier.version()
    }

    /// Checks presence and extension before anything is written.
    pub fn validate_upload(&self, upload: &UploadedImage) -> Result<(), ServiceError> {
        if upload.file_name.trim().is_empty() || upload.bytes.is_empty() {
            return Err(ServiceError::MissingInput);
        }
        match file_extension(&upload.file_name) {
            Some(ext) if self.allowed_extensions.contains(&ext) => Ok(()),
            _ => Err(ServiceError::UnsupportedFileType {
                allowed: self.allowed_extensions.join(", ").to_uppercase(),
            }),
        }
    }

    pub fn predict(
        &self,
        upload: &UploadedImage,
        request: &PredictRequest,
    ) -> Result<PredictResponse, ServiceError> {
        self.validate_upload(upload)?;

        let prepared = self.preprocessor.prepare(&upload.bytes, request.options)?;
        let original = self
            .uploads
            .save_bytes(&ImageStore::original_name(&upload.file_name), &upload.bytes)
            .inspect_err(|_| self.preprocessor.discard(&prepared.processed))?;

        let probabilities = match self.classifier.classify(&prepared.tensor) {
            Ok(probabilities) => probabilities,
            Err(e) => {
                self.preprocessor.discard(&prepared.processed);
                self.uploads.discard(&original);
                return Err(e.into());
            }
        };
        let ranking = rank(&probabilities);
        let results = self.describe(&ranking, &request.language);

        self.log_prediction(&ranking, &results, &original.public_path, &request.location);

        Ok(PredictResponse {
            results,
            low_confidence: ranking.low_confidence,
            image_path: original.public_path,
            processed_image_path: prepared.processed.public_path,
        })
    }

    fn describe(&self, ranking: &Ranking, language: &str) -> Vec<DiagnosisResult> {
        ranking
            .top
            .iter()
            .filter_map(|ranked| {
                let Some(label) = self.mapping.label(ranked.index) else {
                    log::warn!("Classifier produced unknown class index {}", ranked.index);
                    return None;
                };
                let (name, prevention) = match self.catalog.describe(label, language) {
                    Some(d) => (d.name.to_string(), d.prevention.to_vec()),
                    None => {
                        log::warn!("No display metadata for {}", label);
                        (label.to_string(), Vec::new())
                    }
                };
                Some(DiagnosisResult {
                    class: label.to_string(),
                    probability: ranked.probability * 100.0,
                    name,
                    prevention,
                })
            })
            .collect()
    }

    /// Prediction logging never fails the request.
    fn log_prediction(
        &self,
        ranking: &Ranking,
        results: &[DiagnosisResult],
        image_path: &str,
        location: &GeoLocation,
    ) {
        let (Some(best), Some(first)) = (ranking.best(), results.first()) else {
            log::warn!("Nothing to log for {}: no labeled result", image_path);
            return;
        };
        let record = NewPrediction::new(image_path, &first.class, best.probability.clamp(0.0, 1.0))
            .with_location(location.clone());
        if let Err(e) = self.predictions.append(&record) {
            log::error!("Error storing prediction for {}: {}", image_path, e);
        }
    }

    /// Always answers; failures are carried in the success flag and message.
    pub fn feedback(&self, submission: &FeedbackSubmission, contributor: &str) -> FeedbackResponse {
        match self.feedback.submit(submission, contributor).map_err(ServiceError::from) {
            Ok(receipt) => FeedbackResponse {
                success: true,
                message: "Feedback submitted successfully".into(),
                insights: receipt.insights,
            },
            Err(e) => {
                log::error!("Feedback submission failed ({:?}): {}", e.kind(), e);
                FeedbackResponse {
                    success: false,
                    message: format!("Error submitting feedback: {}", e),
                    insights: InsightsSummary::default(),
                }
            }
        }
    }

    pub fn insights(&self) -> InsightsSummary {
        self.insights.compute()
    }
}
