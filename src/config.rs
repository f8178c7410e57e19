//! Configuration persistence for labelscan settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extract::DEFAULT_KEYWORDS;

/// Which way the camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    /// Rear ("environment") camera, best for labels
    #[default]
    Rear,
    Front,
    /// Take whatever device is available
    Any,
}

/// Requested camera stream properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    /// Preferred facing mode; overridden by `device`
    pub facing: Facing,
    /// Explicit device path (e.g. "/dev/video2")
    pub device: Option<String>,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            min_width: 640,
            min_height: 480,
            facing: Facing::Rear,
            device: None,
        }
    }
}

impl CameraConstraints {
    /// Whether a negotiated frame size satisfies the minimum resolution
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }
}

/// Tesseract settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract language codes, tried together
    pub languages: Vec<String>,
    /// Page segmentation mode
    pub psm: i32,
    /// OCR engine mode
    pub oem: i32,
    /// Override DPI hint (None = pick by image size)
    pub dpi: Option<i32>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            languages: vec!["kor".to_string(), "eng".to_string()],
            psm: 3,
            oem: 3,
            dpi: None,
        }
    }
}

/// Live QR scanning settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrSettings {
    /// Delay between scans of the live preview
    pub scan_interval_ms: u64,
    /// Progressive decode passes by max dimension (0 = full resolution)
    pub resolutions: Vec<u32>,
}

impl Default for QrSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: 200,
            resolutions: vec![500, 1500, 0],
        }
    }
}

/// Application configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera: CameraConstraints,
    pub ocr: OcrSettings,
    pub qr: QrSettings,
    /// Product name anchors, tried in order
    pub keywords: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera: CameraConstraints::default(),
            ocr: OcrSettings::default(),
            qr: QrSettings::default(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl CaptureConfig {
    /// Directory name under the user config dir
    pub const ID: &'static str = "labelscan";

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::ID).join("config.json"))
    }

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            log::warn!("No config directory available, using defaults");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Error loading config, using defaults: {:?}", err);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            log::error!("No config directory available, not saving");
            return;
        };
        if let Err(err) = self.save_to(&path) {
            log::error!("Failed to save config: {:?}", err);
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_camera_preferences() {
        let config = CaptureConfig::default();
        assert_eq!(config.camera.ideal_width, 1280);
        assert_eq!(config.camera.ideal_height, 720);
        assert_eq!(config.camera.facing, Facing::Rear);
        assert_eq!(config.ocr.languages, vec!["kor", "eng"]);
        assert_eq!(config.keywords.first().map(String::as_str), Some("상품명"));
    }

    #[test]
    fn test_constraints_minimum() {
        let camera = CameraConstraints::default();
        assert!(camera.accepts(640, 480));
        assert!(camera.accepts(1280, 720));
        assert!(!camera.accepts(320, 240));
        assert!(!camera.accepts(640, 360));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = CaptureConfig::default();
        config.camera.device = Some("/dev/video2".to_string());
        config.qr.scan_interval_ms = 50;
        config.save_to(&path).unwrap();

        let loaded = CaptureConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "camera": { "facing": "Front" } }"#).unwrap();

        let loaded = CaptureConfig::load_from(&path).unwrap();
        assert_eq!(loaded.camera.facing, Facing::Front);
        assert_eq!(loaded.camera.min_width, 640);
        assert_eq!(loaded.qr, QrSettings::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(CaptureConfig::load_from(&path).is_err());
    }
}
