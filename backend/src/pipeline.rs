use std::time::Instant;

use shared::Emotion;

use crate::aggregator::{self, BucketedEmotion, round2};
use crate::classifier::{ClassifierError, EmotionClassifier};
use crate::decoder::{self, DecodeError};

/// Request shape problems, reported to the caller as 400s.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Missing image data")]
    MissingImage,
    #[error("Invalid base64 image data")]
    InvalidBase64(#[source] DecodeError),
}

/// Failures after the request was accepted; these degrade instead of erroring.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Classification(#[from] ClassifierError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmotionResult {
    pub emotion: Emotion,
    pub confidence: f64,
    pub all_emotions: BucketedEmotion,
    pub processing_time_ms: f64,
}

#[derive(Debug)]
pub enum DetectionOutcome {
    Detected(EmotionResult),
    Degraded {
        error: String,
        processing_time_ms: f64,
    },
    Rejected(RequestError),
}

pub struct Pipeline {
    classifier: EmotionClassifier,
    max_dimension: u32,
}

impl Pipeline {
    pub fn new(classifier: EmotionClassifier, max_dimension: u32) -> Self {
        Self {
            classifier,
            max_dimension,
        }
    }

    /// Validate, warm up, decode, classify and aggregate. `started` marks
    /// request entry so latency covers queueing on the blocking pool too.
    pub fn detect(&self, image: Option<&str>, started: Instant) -> DetectionOutcome {
        let Some(image) = image else {
            return DetectionOutcome::Rejected(RequestError::MissingImage);
        };

        self.classifier.warmup();

        let bytes = match decoder::decode_base64(image) {
            Ok(bytes) => bytes,
            Err(e) => return DetectionOutcome::Rejected(RequestError::InvalidBase64(e)),
        };

        match self.analyze(&bytes) {
            Ok(result) => DetectionOutcome::Detected(EmotionResult {
                emotion: result.emotion,
                confidence: result.confidence,
                all_emotions: result.buckets,
                processing_time_ms: elapsed_ms(started),
            }),
            Err(e) => DetectionOutcome::Degraded {
                error: e.to_string(),
                processing_time_ms: elapsed_ms(started),
            },
        }
    }

    fn analyze(&self, bytes: &[u8]) -> Result<aggregator::Aggregate, ProcessingError> {
        let image = decoder::decode_image(bytes, self.max_dimension)?;
        let raw = self.classifier.classify(&image)?;
        Ok(aggregator::aggregate(&raw))
    }
}

pub fn elapsed_ms(started: Instant) -> f64 {
    round2(started.elapsed().as_secs_f64() * 1000.0)
}
