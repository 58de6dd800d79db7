use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid class mapping: {0}")]
    Mapping(#[from] serde_json::Error),
    #[error("Invalid disease catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Class mapping key {0:?} is not a label index")]
    BadIndex(String),
    #[error("Class mapping has no label for index {0}")]
    MissingIndex(usize),
    #[error("Disease {label:?} has no {what} in the fallback language")]
    MissingFallback { label: String, what: &'static str },
    #[error("Disease {label:?} has a name in {language:?} but no prevention steps")]
    MissingPrevention { label: String, language: String },
    #[error("Label {0:?} from the class mapping has no catalog entry")]
    UnknownLabel(String),
}

/// Label index -> label, as written by the training run.
#[derive(Debug, Clone)]
pub struct ClassMapping {
    labels: Vec<String>,
}

impl ClassMapping {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Self::from_json(&read(path.as_ref())?)
    }

    /// Parses `{"0": "label", "1": "label", ...}`. Indices must be contiguous from zero.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let mut by_index = BTreeMap::new();
        for (key, label) in raw {
            let index: usize = key.parse().map_err(|_| CatalogError::BadIndex(key.clone()))?;
            by_index.insert(index, label);
        }
        let mut labels = Vec::with_capacity(by_index.len());
        for (expected, (index, label)) in by_index.into_iter().enumerate() {
            if index != expected {
                return Err(CatalogError::MissingIndex(expected));
            }
            labels.push(label);
        }
        Ok(Self { labels })
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiseaseInfo {
    pub name: HashMap<String, String>,
    pub prevention: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    diseases: HashMap<String, DiseaseInfo>,
}

/// Display name and prevention steps resolved for one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiseaseDescription<'a> {
    pub name: &'a str,
    pub prevention: &'a [String],
}

/// Per-label, per-language display metadata.
#[derive(Debug, Clone)]
pub struct DiseaseCatalog {
    diseases: HashMap<String, DiseaseInfo>,
}

impl DiseaseCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Self::from_yaml(&read(path.as_ref())?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let catalog = Self {
            diseases: file.diseases,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for (label, info) in &self.diseases {
            if !info.name.contains_key(FALLBACK_LANGUAGE) {
                return Err(CatalogError::MissingFallback {
                    label: label.clone(),
                    what: "name",
                });
            }
            if !info.prevention.contains_key(FALLBACK_LANGUAGE) {
                return Err(CatalogError::MissingFallback {
                    label: label.clone(),
                    what: "prevention steps",
                });
            }
            if let Some(language) = info.name.keys().find(|l| !info.prevention.contains_key(*l)) {
                return Err(CatalogError::MissingPrevention {
                    label: label.clone(),
                    language: language.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every label the classifier can emit must be describable.
    pub fn ensure_covers(&self, mapping: &ClassMapping) -> Result<(), CatalogError> {
        match mapping.labels().iter().find(|l| !self.diseases.contains_key(*l)) {
            Some(label) => Err(CatalogError::UnknownLabel(label.clone())),
            None => Ok(()),
        }
    }

    /// Resolves `label` in `language`, falling back to English per field.
    pub fn describe(&self, label: &str, language: &str) -> Option<DiseaseDescription<'_>> {
        let info = self.diseases.get(label)?;
        let name = info
            .name
            .get(language)
            .or_else(|| info.name.get(FALLBACK_LANGUAGE))?;
        let prevention = info
            .prevention
            .get(language)
            .or_else(|| info.prevention.get(FALLBACK_LANGUAGE))?;
        Some(DiseaseDescription {
            name,
            prevention,
        })
    }

    pub fn len(&self) -> usize {
        self.diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty()
    }
}

fn read(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
diseases:
  "Tomato__leaf_mold":
    name:
      en: "Tomato Leaf Mold"
      es: "Moho de la Hoja del Tomate"
    prevention:
      en: ["Improve air circulation"]
      es: ["Mejorar la circulación de aire"]
  "Tomato__healthy":
    name:
      en: "Healthy Tomato"
    prevention:
      en: ["Keep monitoring"]
"#;

    #[test]
    fn falls_back_to_english_for_unknown_language() {
        let catalog = DiseaseCatalog::from_yaml(CATALOG).unwrap();
        let es = catalog.describe("Tomato__leaf_mold", "es").unwrap();
        assert_eq!(es.name, "Moho de la Hoja del Tomate");
        let fr = catalog.describe("Tomato__leaf_mold", "fr").unwrap();
        assert_eq!(fr.name, "Tomato Leaf Mold");
        assert_eq!(fr.prevention.to_vec(), vec!["Improve air circulation".to_string()]);
        assert!(catalog.describe("Potato__healthy", "en").is_none());
    }

    #[test]
    fn rejects_entries_without_english() {
        let yaml = r#"
diseases:
  "X":
    name: { es: "equis" }
    prevention: { es: ["nada"], en: ["nothing"] }
"#;
        let err = DiseaseCatalog::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::MissingFallback { what: "name", .. }));
    }

    #[test]
    fn rejects_names_without_prevention() {
        let yaml = r#"
diseases:
  "X":
    name: { en: "X", hi: "एक्स" }
    prevention: { en: ["nothing"] }
"#;
        let err = DiseaseCatalog::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::MissingPrevention { .. }));
    }

    #[test]
    fn mapping_requires_contiguous_indices() {
        let mapping = ClassMapping::from_json(r#"{"1": "b", "0": "a"}"#).unwrap();
        assert_eq!(mapping.label(0), Some("a"));
        assert_eq!(mapping.label(1), Some("b"));
        assert_eq!(mapping.len(), 2);

        let err = ClassMapping::from_json(r#"{"0": "a", "2": "c"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::MissingIndex(1)));
        let err = ClassMapping::from_json(r#"{"zero": "a"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::BadIndex(_)));
    }

    #[test]
    fn coverage_check_names_missing_label() {
        let catalog = DiseaseCatalog::from_yaml(CATALOG).unwrap();
        let mapping = ClassMapping::from_json(r#"{"0": "Tomato__healthy", "1": "Tomato__mosaic_virus"}"#).unwrap();
        let err = catalog.ensure_covers(&mapping).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownLabel(l) if l == "Tomato__mosaic_virus"));
    }

    #[test]
    fn shipped_configuration_is_complete() {
        let root = env!("CARGO_MANIFEST_DIR");
        let mapping = ClassMapping::load(format!("{}/config/class_mapping.json", root)).unwrap();
        let catalog = DiseaseCatalog::load(format!("{}/config/disease_info.yaml", root)).unwrap();
        assert_eq!(mapping.len(), 13);
        assert_eq!(catalog.len(), 13);
        catalog.ensure_covers(&mapping).unwrap();
        let hi = catalog.describe("Potato__late_blight", "hi").unwrap();
        assert_eq!(hi.prevention.len(), 5);
    }
}
