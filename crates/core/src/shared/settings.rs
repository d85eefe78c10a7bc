use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_CONFIDENCE, DEFAULT_DATABASE_PATH, DEFAULT_DETECTIONS_DIR, DEFAULT_NMS_IOU,
    DEFAULT_THROTTLE_SECS,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Runtime configuration shared by the CLI and any embedding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub detections_dir: PathBuf,
    pub throttle_secs: f64,
    pub confidence: f64,
    pub nms_iou: f64,
    pub plate_model: Option<PathBuf>,
    pub ocr_model: Option<PathBuf>,
    pub ocr_dictionary: Option<PathBuf>,
    pub plate_model_url: Option<String>,
    pub ocr_model_url: Option<String>,
    pub ocr_dictionary_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            detections_dir: PathBuf::from(DEFAULT_DETECTIONS_DIR),
            throttle_secs: DEFAULT_THROTTLE_SECS,
            confidence: DEFAULT_CONFIDENCE,
            nms_iou: DEFAULT_NMS_IOU,
            plate_model: None,
            ocr_model: None,
            ocr_dictionary: None,
            plate_model_url: None,
            ocr_model_url: None,
            ocr_dictionary_url: None,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("PlateGate").join("settings.json"))
    }

    /// Loads settings from the platform config file, falling back to
    /// defaults when it is absent or unreadable.
    pub fn load() -> Self {
        Self::default_path()
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from(&path) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    log::warn!("Ignoring settings file: {e}");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Loads settings from an explicit file. Missing fields take defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SettingsError::Invalid(format!(
                "confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_iou) {
            return Err(SettingsError::Invalid(format!(
                "nms_iou must be between 0.0 and 1.0, got {}",
                self.nms_iou
            )));
        }
        if Duration::try_from_secs_f64(self.throttle_secs).is_err() {
            return Err(SettingsError::Invalid(format!(
                "throttle_secs must be a non-negative number, got {}",
                self.throttle_secs
            )));
        }
        Ok(())
    }

    /// Throttle delay, or the default when `throttle_secs` is out of range.
    pub fn throttle(&self) -> Duration {
        Duration::try_from_secs_f64(self.throttle_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_THROTTLE_SECS))
    }
}
