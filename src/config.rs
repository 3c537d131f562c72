use crate::error::{FaceGateError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    pub verify: VerifyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_warmup_frames() -> u32 {
    3
}

fn default_warmup_delay() -> u64 {
    50
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    pub input_size: u32,
    pub normalization_value: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyConfig {
    pub similarity_threshold: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Directory holding one encoding record per user. Defaults to the
    /// platform data dir when unset.
    #[serde(default)]
    pub encodings_dir: Option<PathBuf>,
    /// Verification log file. Defaults to `verification_log.csv` in the
    /// platform data dir when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Save an annotated snapshot next to the store on each registration.
    #[serde(default)]
    pub save_snapshots: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PreviewConfig {
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(&PathBuf::from("configs/facegate.toml"))
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Config file not found: {}. Please create it from the example.",
                path.display()
            )));
        }

        tracing::debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceGateError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Camera width must be between 1 and 4096, got {}",
                self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Camera height must be between 1 and 4096, got {}",
                self.camera.height
            )));
        }

        if self.verify.similarity_threshold < 0.0 || self.verify.similarity_threshold > 1.0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Similarity threshold must be between 0.0 and 1.0, got {}",
                self.verify.similarity_threshold
            )));
        }
        if self.detector.confidence_threshold < 0.0 || self.detector.confidence_threshold > 1.0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence_threshold
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }

        Ok(())
    }

    /// Directory for encoding records, either from the config file or the
    /// platform data dir.
    pub fn encodings_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage.encodings_dir {
            return Ok(dir.clone());
        }
        Ok(Self::project_data_dir()?.join("encodings"))
    }

    /// Path of the verification log file.
    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.storage.log_file {
            return Ok(path.clone());
        }
        Ok(Self::project_data_dir()?.join("verification_log.csv"))
    }

    fn project_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "facegate", "FaceGate")
            .ok_or_else(|| FaceGateError::Storage("Failed to get project dirs".into()))?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            camera: CameraConfig {
                device_index: 0,
                width: 640,
                height: 480,
                warmup_frames: 3,
                warmup_delay_ms: 50,
            },
            models: ModelConfig {
                detector_path: PathBuf::from("models/detector.onnx"),
                recognizer_path: PathBuf::from("models/recognizer.onnx"),
            },
            detector: DetectorConfig {
                input_width: 640,
                input_height: 640,
                confidence_threshold: 0.5,
            },
            recognizer: RecognizerConfig {
                input_size: 112,
                normalization_value: 127.5,
            },
            verify: VerifyConfig {
                similarity_threshold: 0.6,
            },
            storage: StorageConfig::default(),
            preview: PreviewConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn zero_camera_width_rejected() {
        let mut config = sample_config();
        config.camera.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = sample_config();
        config.verify.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_storage_paths_win_over_defaults() {
        let mut config = sample_config();
        config.storage.encodings_dir = Some(PathBuf::from("/tmp/enc"));
        config.storage.log_file = Some(PathBuf::from("/tmp/log.csv"));
        assert_eq!(config.encodings_dir().unwrap(), PathBuf::from("/tmp/enc"));
        assert_eq!(config.log_file().unwrap(), PathBuf::from("/tmp/log.csv"));
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_src = r#"
            [camera]
            device_index = 0
            width = 640
            height = 480

            [models]
            detector_path = "models/detector.onnx"
            recognizer_path = "models/recognizer.onnx"

            [detector]
            input_width = 640
            input_height = 640
            confidence_threshold = 0.5

            [recognizer]
            input_size = 112
            normalization_value = 127.5

            [verify]
            similarity_threshold = 0.6
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.camera.warmup_frames, 3);
        assert!(config.storage.encodings_dir.is_none());
        assert!(!config.storage.save_snapshots);
    }
}
