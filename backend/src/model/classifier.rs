use ndarray::Axis;
use serde::Deserialize;
use serde_json::json;

use crate::preprocess::InputTensor;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Transport(String),
    #[error("Classifier returned unexpected output: {0}")]
    UnexpectedOutput(String),
    #[error("Model error: {0}")]
    Model(String),
}

/// A pretrained, versioned image classifier: normalized tensor in, one
/// probability per known label out. Loaded once at startup and shared read-only.
pub trait Classifier: Send + Sync {
    fn version(&self) -> &str;

    fn classify(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifierError>;
}

#[derive(Deserialize)]
struct ServingResponse {
    predictions: Vec<Vec<f32>>,
}

/// Classifier hosted behind a model-serving REST endpoint.
pub struct RemoteClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    version: String,
    num_labels: usize,
}

impl RemoteClassifier {
    pub fn new(endpoint: &str, version: &str, num_labels: usize) -> Result<Self, ClassifierError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            version: version.to_string(),
            num_labels,
        })
    }
}

impl Classifier for RemoteClassifier {
    fn version(&self) -> &str {
        &self.version
    }

    fn classify(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifierError> {
        let instances: Vec<Vec<Vec<Vec<f32>>>> = input
            .axis_iter(Axis(0))
            .map(|image| {
                image
                    .outer_iter()
                    .map(|row| row.outer_iter().map(|pixel| pixel.to_vec()).collect())
                    .collect()
            })
            .collect();

        let response: ServingResponse = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "instances": instances }))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        let probabilities = response
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| ClassifierError::UnexpectedOutput("empty predictions".into()))?;
        check_output(probabilities, self.num_labels)
    }
}

pub(crate) fn check_output(
    probabilities: Vec<f32>,
    num_labels: usize,
) -> Result<Vec<f32>, ClassifierError> {
    if probabilities.len() != num_labels {
        return Err(ClassifierError::UnexpectedOutput(format!(
            "expected {} probabilities, got {}",
            num_labels,
            probabilities.len()
        )));
    }
    Ok(probabilities)
}

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use std::sync::Mutex;

    use tch::{CModule, Device, IValue, Kind, Tensor};

    use super::{Classifier, ClassifierError, check_output};
    use crate::preprocess::InputTensor;

    /// TorchScript model evaluated in-process. Input is permuted to NCHW.
    pub struct TorchClassifier {
        module: Mutex<CModule>,
        device: Device,
        version: String,
        num_labels: usize,
    }

    impl TorchClassifier {
        pub fn load(model_path: &str, version: &str, num_labels: usize) -> Result<Self, ClassifierError> {
            let device = Device::cuda_if_available();
            let module = CModule::load_on_device(model_path, device)
                .map_err(|e| ClassifierError::Model(e.to_string()))?;
            log::info!("Loaded TorchScript model {} on {:?}", model_path, device);
            Ok(Self {
                module: Mutex::new(module),
                device,
                version: version.to_string(),
                num_labels,
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn version(&self) -> &str {
            &self.version
        }

        fn classify(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifierError> {
            let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
            let data: Vec<f32> = input.iter().copied().collect();
            let tensor = Tensor::from_slice(&data)
                .view(shape.as_slice())
                .permute([0, 3, 1, 2])
                .to_device(self.device);

            let module = self
                .module
                .lock()
                .map_err(|_| ClassifierError::Model("model lock poisoned".into()))?;
            let output = match module
                .forward_is(&[IValue::Tensor(tensor)])
                .map_err(|e| ClassifierError::Model(e.to_string()))?
            {
                IValue::Tensor(t) => t,
                other => {
                    return Err(ClassifierError::UnexpectedOutput(format!("{:?}", other)));
                }
            };

            let output_flat = output.softmax(-1, Kind::Float).view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            let mut output_vec = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut output_vec, num_elements);
            check_output(output_vec, self.num_labels)
        }
    }
}
