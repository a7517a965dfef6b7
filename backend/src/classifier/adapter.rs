use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{AnalyzeOptions, EmotionModel, ModelError, ModelResponse, RawEmotionScores};
use crate::config::{ModelConfig, WarmupConfig};
use crate::decoder::NormalizedImage;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Model returned no face analyses")]
    NoResults,
}

/// Wraps the emotion model with fixed options and a cold/warm flag.
///
/// The flag only moves from cold to warm. Concurrent first requests may each
/// run the warmup inference; that work is idempotent, so no lock is held.
pub struct EmotionClassifier {
    model: Arc<dyn EmotionModel>,
    options: AnalyzeOptions,
    warmup: WarmupConfig,
    warmed_up: AtomicBool,
}

impl EmotionClassifier {
    pub fn new(model: Arc<dyn EmotionModel>, config: &ModelConfig, warmup: WarmupConfig) -> Self {
        Self {
            model,
            options: AnalyzeOptions::emotion_only(config.detector_backend),
            warmup,
            warmed_up: AtomicBool::new(false),
        }
    }

    /// Runs the model, turning a panic inside it into a `ModelError` so one
    /// bad frame cannot take down the worker.
    fn analyze(&self, image: &NormalizedImage) -> Result<ModelResponse, ModelError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.model.analyze(image, &self.options)))
            .unwrap_or_else(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ModelError::Inference(format!("model panicked: {reason}")))
            })
    }

    pub fn is_warm(&self) -> bool {
        self.warmed_up.load(Ordering::Acquire)
    }

    /// Runs a dummy inference on a blank frame the first time it is called.
    /// Failures are logged and leave the classifier cold so the next request
    /// tries again.
    pub fn warmup(&self) {
        if self.is_warm() {
            return;
        }
        log::info!("🔥 Warming up emotion model...");
        let dummy = NormalizedImage::blank(self.warmup.size, self.warmup.fill);
        match self.analyze(&dummy) {
            Ok(_) => {
                self.warmed_up.store(true, Ordering::Release);
                log::info!("✅ Models loaded successfully!");
            }
            Err(e) => log::warn!("⚠️ Warmup failed: {}", e),
        }
    }

    pub fn classify(&self, image: &NormalizedImage) -> Result<RawEmotionScores, ClassifierError> {
        let response = self.analyze(image)?;
        let analysis = match response {
            ModelResponse::Single(analysis) => analysis,
            ModelResponse::Many(analyses) => {
                if analyses.len() > 1 {
                    log::debug!("{} faces detected, using the first", analyses.len());
                }
                analyses.into_iter().next().ok_or(ClassifierError::NoResults)?
            }
        };
        log::debug!(
            "Model region {:?} (face confidence {:.2}), raw dominant: {}",
            analysis.region,
            analysis.face_confidence,
            analysis.dominant_emotion
        );
        Ok(analysis.emotion)
    }
}
