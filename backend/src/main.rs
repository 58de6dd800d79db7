mod config;
mod db;
mod feedback;
mod insights;
mod model;
mod preprocess;
mod routes;
mod service;
mod storage;

use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use config::AppConfig;
use db::Database;
use model::{ClassMapping, Classifier, DiseaseCatalog, RemoteClassifier};
use routes::{UploadLimit, configure_routes};
use service::DiagnosisService;

fn startup_error(what: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", what, e);
    std::io::Error::other(format!("{}: {}", what, e))
}

/// Loads the classifier once; it is shared read-only until the process exits.
fn load_classifier(config: &AppConfig, num_labels: usize) -> std::io::Result<Arc<dyn Classifier>> {
    #[cfg(feature = "torch")]
    {
        if let Some(model_path) = &config.model_path {
            let classifier = model::TorchClassifier::load(model_path, &config.classifier_version, num_labels)
                .map_err(|e| startup_error("Failed to load model", e))?;
            return Ok(Arc::new(classifier));
        }
    }

    match &config.classifier_url {
        Some(url) => {
            let classifier = RemoteClassifier::new(url, &config.classifier_version, num_labels)
                .map_err(|e| startup_error("Failed to create classifier client", e))?;
            log::info!("Using remote classifier at {}", url);
            Ok(Arc::new(classifier))
        }
        None => Err(startup_error(
            "No classifier configured",
            "set CLASSIFIER_URL (or MODEL_PATH with the torch feature)",
        )),
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let mapping = ClassMapping::load(&config.class_mapping_path)
        .map_err(|e| startup_error("Failed to load class mapping", e))?;
    let catalog = DiseaseCatalog::load(&config.disease_info_path)
        .map_err(|e| startup_error("Failed to load disease catalog", e))?;
    catalog
        .ensure_covers(&mapping)
        .map_err(|e| startup_error("Disease catalog is incomplete", e))?;
    log::info!("Loaded {} labels and {} catalog entries", mapping.len(), catalog.len());

    // The blocking HTTP client must be built outside the async runtime.
    let classifier = load_classifier(&config, mapping.len())?;
    log::info!("Classifier version: {}", classifier.version());

    let db = Database::open(&config.database_path)
        .map_err(|e| startup_error("Failed to open database", e))?;
    log::info!("Database: {}", config.database_path.display());

    let service = DiagnosisService::new(&config, db, classifier, mapping, catalog)
        .map_err(|e| startup_error("Failed to prepare image directories", e))?;
    for dir in config.image_dirs() {
        log::info!("Serving {} at {}", dir.display(), AppConfig::public_prefix(dir));
    }

    let service = web::Data::new(service);
    let limit = web::Data::new(UploadLimit(config.max_content_length));
    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(
                    Cors::default()
                        .allow_any_origin()
                        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                        .allowed_headers(vec![
                            actix_web::http::header::ACCEPT,
                            actix_web::http::header::CONTENT_TYPE,
                        ])
                        .max_age(3600),
                )
                .app_data(service.clone())
                .app_data(limit.clone())
                .configure(|cfg| configure_routes(cfg, &config))
        })
        .bind(&bind_address)?
        .run()
        .await
    })
}
