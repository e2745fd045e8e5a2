//! Inference engines.
//!
//! [`Inferencer`] is the seam between the prediction service and the
//! numeric routine. Implementations are synchronous and CPU-bound; the
//! service calls them from the blocking thread pool.

#[cfg(feature = "onnx")]
mod onnx;

use std::path::PathBuf;

#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;

use crate::Result;
use crate::types::FeatureVector;

/// A loaded model that maps one feature vector to one prediction.
pub trait Inferencer: Send + Sync {
    /// Engine name, recorded as the origin of cached values.
    fn name(&self) -> &str;

    /// Compute one prediction.
    ///
    /// `features` must have exactly the length the model expects; anything
    /// else fails with `InvalidInput` before touching the model.
    fn predict(&self, features: &[f32]) -> Result<f32>;

    /// Compute one prediction per input, in order.
    ///
    /// Equivalent to calling [`predict`](Self::predict) for each item.
    fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<f32>> {
        batch.iter().map(|f| self.predict(f.as_slice())).collect()
    }

    /// Whether the model is loaded and accepting calls.
    fn is_loaded(&self) -> bool;

    /// Release the model. Later calls fail with `ModelUnavailable`.
    /// Safe to call more than once.
    fn close(&self);
}

/// Compute device for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,

    #[cfg(feature = "cuda")]
    Cuda {
        /// GPU device ID (0-indexed).
        device_id: u32,
    },
}

impl Device {
    /// Device name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            #[cfg(feature = "cuda")]
            Self::Cuda { .. } => "CUDA",
        }
    }
}

/// Model artifact location and graph I/O names.
///
/// ```rust
/// # use huginn::ModelConfig;
/// let config = ModelConfig::new("models/lightgbm_model.onnx").input_name("input");
/// ```
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Graph input name. Default: `input`.
    pub input_name: String,
    /// Graph output name. Default: `output`.
    pub output_name: String,
    pub device: Device,
}

impl ModelConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            input_name: "input".into(),
            output_name: "output".into(),
            device: Device::default(),
        }
    }

    pub fn input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HuginnError;
    use crate::types::NUM_FEATURES;

    struct Sum;

    impl Inferencer for Sum {
        fn name(&self) -> &str {
            "sum"
        }

        fn predict(&self, features: &[f32]) -> Result<f32> {
            if features.len() != NUM_FEATURES {
                return Err(HuginnError::invalid("INVALID_FEATURES", "wrong length"));
            }
            Ok(features.iter().sum())
        }

        fn is_loaded(&self) -> bool {
            true
        }

        fn close(&self) {}
    }

    #[test]
    fn batch_matches_repeated_single_calls() {
        let mut a = [0.0; NUM_FEATURES];
        a[0] = 1.5;
        let mut b = [0.0; NUM_FEATURES];
        b[3] = 2.0;
        let batch = [FeatureVector::from(a), FeatureVector::from(b)];

        let out = Sum.predict_batch(&batch).unwrap();
        assert_eq!(out, vec![Sum.predict(&a).unwrap(), Sum.predict(&b).unwrap()]);
    }

    #[test]
    fn default_device_is_cpu() {
        assert_eq!(Device::default().name(), "CPU");
        assert_eq!(ModelConfig::new("m.onnx").device, Device::Cpu);
    }
}
