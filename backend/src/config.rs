use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    NotANumber { key: &'static str, value: String },
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

/// Runtime settings, read from the environment (and an optional `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub upload_folder: PathBuf,
    pub processed_folder: PathBuf,
    pub contributions_folder: PathBuf,
    pub database_path: PathBuf,
    /// Largest accepted request body in bytes.
    pub max_content_length: usize,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
    pub class_mapping_path: PathBuf,
    pub disease_info_path: PathBuf,
    pub classifier_url: Option<String>,
    pub classifier_version: String,
    pub model_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            upload_folder: PathBuf::from("static/uploads"),
            processed_folder: PathBuf::from("static/processed"),
            contributions_folder: PathBuf::from("static/contributions"),
            database_path: PathBuf::from("database/crop_disease.db"),
            max_content_length: 16 * 1024 * 1024,
            allowed_extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
            class_mapping_path: PathBuf::from("config/class_mapping.json"),
            disease_info_path: PathBuf::from("config/disease_info.yaml"),
            classifier_url: None,
            classifier_version: "unversioned".into(),
            model_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, keeping defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let path = |key: &str, default: PathBuf| get(key).map(PathBuf::from).unwrap_or(default);

        let allowed_extensions = match get("ALLOWED_EXTENSIONS") {
            Some(raw) => {
                let extensions: Vec<String> = raw
                    .split(',')
                    .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect();
                if extensions.is_empty() {
                    return Err(ConfigError::Empty {
                        key: "ALLOWED_EXTENSIONS",
                    });
                }
                extensions
            }
            None => defaults.allowed_extensions,
        };

        Ok(Self {
            port: number(get("PORT"), "PORT", defaults.port)?,
            upload_folder: path("UPLOAD_FOLDER", defaults.upload_folder),
            processed_folder: path("PROCESSED_FOLDER", defaults.processed_folder),
            contributions_folder: path("CONTRIBUTIONS_FOLDER", defaults.contributions_folder),
            database_path: path("DATABASE_PATH", defaults.database_path),
            max_content_length: number(
                get("MAX_CONTENT_LENGTH"),
                "MAX_CONTENT_LENGTH",
                defaults.max_content_length,
            )?,
            allowed_extensions,
            class_mapping_path: path("CLASS_MAPPING_PATH", defaults.class_mapping_path),
            disease_info_path: path("DISEASE_INFO_PATH", defaults.disease_info_path),
            classifier_url: get("CLASSIFIER_URL"),
            classifier_version: get("CLASSIFIER_VERSION").unwrap_or(defaults.classifier_version),
            model_path: get("MODEL_PATH"),
        })
    }

    /// Public URL prefix an image directory is served under.
    pub fn public_prefix(dir: &Path) -> String {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("/static/{}", name)
    }

    pub fn image_dirs(&self) -> [&Path; 3] {
        [
            self.upload_folder.as_path(),
            self.processed_folder.as_path(),
            self.contributions_folder.as_path(),
        ]
    }
}

fn number<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::NotANumber { key, value }),
        None => Ok(default),
    }
}
