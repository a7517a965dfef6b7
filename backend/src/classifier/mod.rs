//! Facial emotion model boundary.
//!
//! The model itself is an external collaborator behind [`EmotionModel`]. The
//! [`EmotionClassifier`] adapter fixes the analysis options, resolves the
//! single/many response shapes and owns the one-time warmup.

pub mod adapter;
#[cfg(feature = "torch")]
pub mod torch_model;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::decoder::NormalizedImage;

pub use adapter::{ClassifierError, EmotionClassifier};

#[cfg_attr(not(feature = "torch"), allow(dead_code))]
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),
    #[error("Emotion model backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Model inference error: {0}")]
    Inference(String),
    #[error("Model returned {got} scores for {expected} labels")]
    OutputShape { expected: usize, got: usize },
}

#[cfg(feature = "torch")]
impl From<tch::TchError> for ModelError {
    fn from(err: tch::TchError) -> Self {
        ModelError::Inference(err.to_string())
    }
}

/// Face detector requested from the model. `Opencv` is the lightweight
/// choice; `Skip` asks for the whole frame. Backends without a detector
/// treat both as `Skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    Opencv,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Emotion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeOptions {
    pub actions: Vec<Action>,
    pub enforce_detection: bool,
    pub detector_backend: DetectorBackend,
}

impl AnalyzeOptions {
    /// Emotion analysis only, never failing on frames without a face.
    pub fn emotion_only(detector_backend: DetectorBackend) -> Self {
        Self {
            actions: vec![Action::Emotion],
            enforce_detection: false,
            detector_backend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Per-category scores in the model's vocabulary, roughly summing to 100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEmotionScores(HashMap<String, f64>);

impl RawEmotionScores {
    #[cfg_attr(not(feature = "torch"), allow(dead_code))]
    pub fn new(scores: HashMap<String, f64>) -> Self {
        Self(scores)
    }

    /// Score for `category`, zero when the model did not report it.
    pub fn get(&self, category: &str) -> f64 {
        self.0.get(category).copied().unwrap_or(0.0)
    }
}

impl<const N: usize> From<[(&str, f64); N]> for RawEmotionScores {
    fn from(pairs: [(&str, f64); N]) -> Self {
        Self(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    pub emotion: RawEmotionScores,
    pub dominant_emotion: String,
    pub region: FaceRegion,
    pub face_confidence: f64,
}

/// The model answers with either one analysis or one per detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Single(FaceAnalysis),
    Many(Vec<FaceAnalysis>),
}

pub trait EmotionModel: Send + Sync {
    fn analyze(
        &self,
        image: &NormalizedImage,
        options: &AnalyzeOptions,
    ) -> Result<ModelResponse, ModelError>;
}

/// Installed when the binary was built without an inference backend.
#[cfg(not(feature = "torch"))]
pub struct UnavailableModel {
    reason: String,
}

#[cfg(not(feature = "torch"))]
impl UnavailableModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(not(feature = "torch"))]
impl EmotionModel for UnavailableModel {
    fn analyze(
        &self,
        _image: &NormalizedImage,
        _options: &AnalyzeOptions,
    ) -> Result<ModelResponse, ModelError> {
        Err(ModelError::BackendUnavailable(self.reason.clone()))
    }
}

#[cfg(feature = "torch")]
pub fn load_backend(config: &ModelConfig) -> Arc<dyn EmotionModel> {
    log::info!("Using TorchScript emotion model at {}", config.path.display());
    Arc::new(torch_model::TorchEmotionModel::new(config))
}

#[cfg(not(feature = "torch"))]
pub fn load_backend(config: &ModelConfig) -> Arc<dyn EmotionModel> {
    log::warn!(
        "⚠️ No inference backend compiled in: {} will not be loaded and every detection will return a degraded response. Rebuild with `cargo build --features torch` (requires libtorch).",
        config.path.display()
    );
    Arc::new(UnavailableModel::new(NO_BACKEND_REASON))
}

#[cfg(not(feature = "torch"))]
const NO_BACKEND_REASON: &str = "built without the `torch` feature; rebuild with `cargo build --features torch` to enable inference";
