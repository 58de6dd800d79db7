use std::collections::HashMap;

use actix_files::Files;
use actix_multipart::{Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use shared::{ErrorResponse, FeedbackResponse, InsightsSummary};

use crate::config::AppConfig;
use crate::db::GeoLocation;
use crate::feedback::FeedbackSubmission;
use crate::preprocess::PreprocessOptions;
use crate::service::{DiagnosisService, PredictRequest, UploadedImage};

/// Upper bound on the summed size of all multipart fields of one request.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

#[derive(Debug, thiserror::Error)]
enum FormError {
    #[error("Upload exceeds the {0} byte limit")]
    TooLarge(usize),
    #[error("Malformed form data: {0}")]
    Multipart(#[from] MultipartError),
}

impl FormError {
    fn status(&self) -> StatusCode {
        match self {
            FormError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            FormError::Multipart(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Text fields and files of a multipart request, keyed by field name.
#[derive(Default)]
struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedImage>,
}

impl FormData {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn flag(&self, name: &str) -> bool {
        self.text(name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn location(&self) -> GeoLocation {
        GeoLocation {
            name: self.text("location_name").map(str::to_string),
            latitude: self.text("latitude").and_then(|v| v.parse().ok()),
            longitude: self.text("longitude").and_then(|v| v.parse().ok()),
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, config: &AppConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/feedback").route(web::post().to(feedback)))
        .service(web::resource("/insights").route(web::get().to(insights)));
    for dir in config.image_dirs() {
        cfg.service(Files::new(&AppConfig::public_prefix(dir), dir));
    }
}

async fn read_form(mut payload: Multipart, limit: usize) -> Result<FormData, FormError> {
    let mut form = FormData::default();
    let mut total = 0usize;

    while let Some(mut field) = payload.try_next().await? {
        let disposition = field.content_disposition().cloned();
        let name = disposition.as_ref().and_then(|d| d.get_name()).map(str::to_string);
        let file_name = disposition
            .as_ref()
            .and_then(|d| d.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            total += chunk.len();
            if total > limit {
                return Err(FormError::TooLarge(limit));
            }
            data.extend_from_slice(&chunk);
        }

        let Some(name) = name else {
            continue;
        };
        match file_name {
            Some(file_name) if !file_name.is_empty() && !data.is_empty() => {
                form.files.insert(name, UploadedImage { file_name, bytes: data });
            }
            // A file input left empty by the browser.
            Some(_) => {}
            None => {
                form.fields
                    .insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }
    Ok(form)
}

fn error_response(status: StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse { error: message })
}

async fn predict(
    service: web::Data<DiagnosisService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> HttpResponse {
    let mut form = match read_form(payload, limit.0).await {
        Ok(form) => form,
        Err(e) => return error_response(e.status(), e.to_string()),
    };

    let request = PredictRequest {
        options: PreprocessOptions {
            enhance_contrast: form.flag("enhance_contrast"),
            auto_crop: form.flag("auto_crop"),
        },
        language: form.text("language").unwrap_or("en").to_string(),
        location: form.location(),
    };
    let upload = form.files.remove("file").unwrap_or_default();

    let service = service.into_inner();
    match web::block(move || service.predict(&upload, &request)).await {
        Ok(Ok(response)) => {
            info!(
                "Diagnosed {} (low confidence: {})",
                response.image_path, response.low_confidence
            );
            HttpResponse::Ok().json(response)
        }
        Ok(Err(e)) if e.is_caller_error() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Ok(Err(e)) => {
            error!("Prediction failed ({:?}): {}", e.kind(), e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Prediction worker failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed".into())
        }
    }
}

fn failed_feedback(message: String) -> HttpResponse {
    HttpResponse::Ok().json(FeedbackResponse {
        success: false,
        message: format!("Error submitting feedback: {}", message),
        insights: InsightsSummary::default(),
    })
}

async fn feedback(
    req: HttpRequest,
    service: web::Data<DiagnosisService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> HttpResponse {
    let mut form = match read_form(payload, limit.0).await {
        Ok(form) => form,
        Err(e) => return failed_feedback(e.to_string()),
    };

    let Some(original_label) = form.text("original_prediction").map(str::to_string) else {
        return failed_feedback("original_prediction is required".into());
    };
    let original_confidence = match form.text("confidence").map(str::parse::<f32>) {
        Some(Ok(confidence)) => confidence,
        Some(Err(_)) | None => return failed_feedback("confidence must be a number".into()),
    };

    let submission = FeedbackSubmission {
        original_label,
        original_confidence,
        is_correct: form.flag("is_correct"),
        corrected_label: form.text("corrected_disease").map(str::to_string),
        contribute: form.flag("contribute_to_dataset"),
        location: form.location(),
        image: form.files.remove("image"),
    };
    let contributor = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let service = service.into_inner();
    match web::block(move || service.feedback(&submission, &contributor)).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            error!("Feedback worker failed: {}", e);
            failed_feedback(e.to_string())
        }
    }
}

async fn insights(service: web::Data<DiagnosisService>) -> HttpResponse {
    let service = service.into_inner();
    match web::block(move || service.insights()).await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            error!("Insights worker failed: {}", e);
            HttpResponse::Ok().json(InsightsSummary::default())
        }
    }
}
