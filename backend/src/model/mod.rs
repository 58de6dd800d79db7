pub mod catalog;
pub mod classifier;
pub mod ranking;

pub use catalog::{CatalogError, ClassMapping, DiseaseCatalog};
#[cfg(feature = "torch")]
pub use classifier::TorchClassifier;
pub use classifier::{Classifier, ClassifierError, RemoteClassifier};
pub use ranking::{Ranking, rank};
