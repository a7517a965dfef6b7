use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::classifier::DetectorBackend;

const DEFAULT_CONFIG_PATH: &str = "config/service.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub service: ServiceMetadata,
    pub image: ImageConfig,
    pub model: ModelConfig,
    pub warmup: WarmupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceMetadata {
    pub name: String,
    pub title: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub max_dimension: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub labels: Vec<String>,
    pub input_size: u32,
    pub detector_backend: DetectorBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub size: u32,
    pub fill: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            workers: None,
        }
    }
}

impl Default for ServiceMetadata {
    fn default() -> Self {
        Self {
            name: "deepface-emotion-detector".to_string(),
            title: "DeepFace Emotion Detection API".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { max_dimension: 1024 }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/emotion.pt"),
            labels: ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
            input_size: 48,
            detector_backend: DetectorBackend::Opencv,
        }
    }
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self { size: 224, fill: 0 }
    }
}

impl ServiceConfig {
    /// Reads the YAML file named by `EMOTION_CONFIG` (or the default path),
    /// then applies `HOST`, `PORT` and `MODEL_PATH` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("EMOTION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "No config file at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(model_path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(model_path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.max_dimension == 0 {
            return Err(ConfigError::Invalid("image.max_dimension must be non-zero".into()));
        }
        if self.model.input_size == 0 {
            return Err(ConfigError::Invalid("model.input_size must be non-zero".into()));
        }
        if self.warmup.size == 0 {
            return Err(ConfigError::Invalid("warmup.size must be non-zero".into()));
        }
        if self.model.labels.is_empty() {
            return Err(ConfigError::Invalid("model.labels must not be empty".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
