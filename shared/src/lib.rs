use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The three coarse buckets reported to callers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Emotion {
    Happy,
    Neutral,
    Sad,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DetectEmotionRequest {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmotionScores {
    pub happy: f64,
    pub neutral: f64,
    pub sad: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EmotionResponse {
    pub emotion: Emotion,
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub all_emotions: EmotionScores,
}

/// Returned with a 200 when processing failed after the request was accepted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DegradedResponse {
    pub emotion: Emotion,
    pub confidence: f64,
    pub error: String,
    pub processing_time_ms: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotFoundResponse {
    pub error: String,
    pub available_endpoints: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Endpoints {
    pub health: String,
    pub detect_emotion: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub endpoints: Endpoints,
    pub status: String,
}
