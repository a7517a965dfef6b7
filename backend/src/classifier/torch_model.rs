use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};
use tch::{CModule, Device, Kind, Tensor};

use super::{
    Action, AnalyzeOptions, EmotionModel, FaceAnalysis, FaceRegion, ModelError, ModelResponse,
    RawEmotionScores,
};
use crate::config::ModelConfig;
use crate::decoder::NormalizedImage;

/// TorchScript facial-expression classifier.
///
/// The module is loaded on first use. It takes a `[1, 1, s, s]` grayscale
/// tensor scaled to `[0, 1]` and produces one logit per label.
///
/// No face detector ships with the module: `detector_backend` is accepted
/// and ignored, and the whole frame is analysed as a single region.
#[derive(Clone)]
pub struct TorchEmotionModel {
    path: PathBuf,
    labels: Vec<String>,
    input_size: u32,
    device: Device,
    module: Arc<Mutex<Option<CModule>>>,
}

impl TorchEmotionModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            path: config.path.clone(),
            labels: config.labels.clone(),
            input_size: config.input_size,
            device: Device::cuda_if_available(),
            module: Arc::new(Mutex::new(None)),
        }
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        // A load interrupted by a panic leaves `None` behind, which is safe to retry.
        let mut guard = self.module.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            if !self.path.exists() {
                return Err(ModelError::ModelNotFound(self.path.display().to_string()));
            }
            log::info!("Loading TorchScript model from {}", self.path.display());
            *guard = Some(CModule::load_on_device(&self.path, self.device)?);
        }
        match guard.as_ref() {
            Some(module) => Ok(module.forward_ts(&[input.f_to_device(self.device)?])?),
            None => Err(ModelError::Inference("model not loaded".into())),
        }
    }

    fn preprocess(&self, image: &NormalizedImage) -> Result<Tensor, ModelError> {
        let gray = imageops::grayscale(image.pixels());
        let face = imageops::resize(&gray, self.input_size, self.input_size, FilterType::Triangle);
        let data: Vec<f32> = face.into_raw().into_iter().map(|p| p as f32 / 255.0).collect();
        let size = self.input_size as i64;
        Ok(Tensor::from_slice(&data).f_view([1, 1, size, size])?)
    }

    fn scores(&self, logits: Tensor) -> Result<RawEmotionScores, ModelError> {
        let probs = logits
            .f_softmax(-1, Kind::Float)?
            .f_to_device(Device::Cpu)?
            .f_view([-1])?;
        let num_elements = probs.size()[0] as usize;
        if num_elements != self.labels.len() {
            return Err(ModelError::OutputShape {
                expected: self.labels.len(),
                got: num_elements,
            });
        }
        let mut values = vec![0.0f32; num_elements];
        probs.f_copy_data(&mut values, num_elements)?;
        let scores: HashMap<String, f64> = self
            .labels
            .iter()
            .cloned()
            .zip(values.into_iter().map(|p| p as f64 * 100.0))
            .collect();
        Ok(RawEmotionScores::new(scores))
    }
}

impl EmotionModel for TorchEmotionModel {
    fn analyze(
        &self,
        image: &NormalizedImage,
        options: &AnalyzeOptions,
    ) -> Result<ModelResponse, ModelError> {
        if !options.actions.contains(&Action::Emotion) {
            return Err(ModelError::Inference("only the emotion action is supported".into()));
        }
        log::debug!(
            "Analysing {}x{} frame (detector: {:?}, enforce: {})",
            image.width(),
            image.height(),
            options.detector_backend,
            options.enforce_detection
        );
        let input = self.preprocess(image)?;
        let logits = tch::no_grad(|| self.forward(&input))?;
        let emotion = self.scores(logits)?;
        let dominant_emotion = self
            .labels
            .iter()
            .max_by(|a, b| emotion.get(a).total_cmp(&emotion.get(b)))
            .cloned()
            .unwrap_or_default();

        Ok(ModelResponse::Single(FaceAnalysis {
            emotion,
            dominant_emotion,
            region: FaceRegion {
                x: 0,
                y: 0,
                w: image.width(),
                h: image.height(),
            },
            face_confidence: 0.0,
        }))
    }
}
