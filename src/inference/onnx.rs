//! ONNX Runtime engine.

use std::path::Path;

use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use parking_lot::Mutex;
use tracing::info;

use super::{Device, Inferencer, ModelConfig};
use crate::types::{FeatureVector, NUM_FEATURES};
use crate::{HuginnError, Result};

/// Session plus its reusable input buffer. Only reachable through the lock.
struct SessionState {
    session: Session,
    input: [f32; NUM_FEATURES],
}

/// Single-session ONNX engine.
///
/// All calls serialize on one mutex: the session and its input buffer are
/// a pool of size one. The caller's vector is copied into the owned buffer
/// under the lock, so no per-call input allocation happens.
pub struct OnnxEngine {
    state: Mutex<Option<SessionState>>,
    input_name: String,
    output_name: String,
    name: String,
}

impl OnnxEngine {
    /// Load the model at `config.path`.
    ///
    /// Fails fast with `ModelUnavailable` if the file does not exist.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        if !config.path.is_file() {
            return Err(HuginnError::ModelUnavailable(format!(
                "model file not found: {}",
                config.path.display()
            )));
        }

        let session = build_session(&config.path, &config.device)?;
        info!(
            path = %config.path.display(),
            device = config.device.name(),
            "ONNX model loaded"
        );

        Ok(Self {
            state: Mutex::new(Some(SessionState {
                session,
                input: [0.0; NUM_FEATURES],
            })),
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
            name: format!("onnx:{}", file_stem(&config.path)),
        })
    }

    fn run(&self, state: &mut SessionState, features: &[f32]) -> Result<f32> {
        if features.len() != NUM_FEATURES {
            return Err(HuginnError::invalid(
                "INVALID_FEATURES",
                format!(
                    "features must have exactly {NUM_FEATURES} elements, got {}",
                    features.len()
                ),
            ));
        }

        let SessionState { session, input } = state;
        input.copy_from_slice(features);

        let tensor = TensorRef::from_array_view(([1_usize, NUM_FEATURES], &input[..]))
            .map_err(|e| HuginnError::ComputeFailed(format!("failed to create input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| HuginnError::ComputeFailed(format!("ONNX inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            HuginnError::ComputeFailed(format!("no output named {}", self.output_name))
        })?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| HuginnError::ComputeFailed(format!("failed to extract output: {e}")))?;

        data.first()
            .copied()
            .ok_or_else(|| HuginnError::ComputeFailed("model produced an empty output".into()))
    }
}

impl Inferencer for OnnxEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &[f32]) -> Result<f32> {
        let mut guard = self.state.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| HuginnError::ModelUnavailable("engine closed".into()))?;
        self.run(state, features)
    }

    /// Takes the lock once for the whole batch.
    fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<f32>> {
        let mut guard = self.state.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| HuginnError::ModelUnavailable("engine closed".into()))?;
        batch
            .iter()
            .map(|features| self.run(state, features.as_slice()))
            .collect()
    }

    fn is_loaded(&self) -> bool {
        self.state.lock().is_some()
    }

    fn close(&self) {
        if self.state.lock().take().is_some() {
            info!("ONNX session released");
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".into())
}

fn build_session(model_path: &Path, device: &Device) -> Result<Session> {
    let builder = Session::builder()
        .map_err(|e| HuginnError::ModelUnavailable(format!("failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| HuginnError::ModelUnavailable(format!("failed to set optimization level: {e}")))?;

    let builder = match device {
        Device::Cpu => builder,
        #[cfg(feature = "cuda")]
        Device::Cuda { device_id } => {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(*device_id as i32)
                    .build()])
                .map_err(|e| HuginnError::ModelUnavailable(format!("failed to configure CUDA: {e}")))?
        }
    };

    builder
        .commit_from_file(model_path)
        .map_err(|e| HuginnError::ModelUnavailable(format!("failed to load ONNX model: {e}")))
}
