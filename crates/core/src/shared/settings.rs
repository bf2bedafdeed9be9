use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Every tunable of the live labelling pipeline.
///
/// Loadable from a JSON file; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Device path, index string, file or stream URL handed to ffmpeg.
    pub source: String,
    /// ffmpeg input formats tried in order (e.g. `v4l2`, `avfoundation`, `dshow`).
    /// Empty lets ffmpeg probe the source.
    pub backends: Vec<String>,
    pub capture_width: Option<u32>,
    pub capture_height: Option<u32>,
    pub verbose: bool,

    pub sample_interval: usize,
    pub min_confidence: f64,
    pub detection_score: f64,
    pub match_distance: f64,
    pub validity_window_ms: u64,
    pub refresh_interval: usize,

    pub queue_dir: PathBuf,
    pub queue_timeout_ms: u64,
    pub submit_mailbox: usize,
    pub jpeg_quality: u8,

    pub enrollment_flag: Option<PathBuf>,
    pub rebuild_command: Vec<String>,
    pub rebuild_timeout_ms: u64,

    pub output: PathBuf,
    pub output_format: Option<String>,
    pub output_width: u32,
    pub output_height: u32,
    pub output_fps: u32,
    pub label_font: Option<PathBuf>,
    pub show_fps: bool,

    /// Detector weights to use instead of the cached download.
    pub model: Option<PathBuf>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            source: "/dev/video0".to_string(),
            backends: Vec::new(),
            capture_width: None,
            capture_height: None,
            verbose: false,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            detection_score: DEFAULT_DETECTION_SCORE,
            match_distance: DEFAULT_MATCH_DISTANCE,
            validity_window_ms: DEFAULT_VALIDITY_WINDOW_MS,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            queue_dir: PathBuf::from("facetag-queue"),
            queue_timeout_ms: DEFAULT_QUEUE_TIMEOUT_MS,
            submit_mailbox: DEFAULT_SUBMIT_MAILBOX,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            enrollment_flag: None,
            rebuild_command: Vec::new(),
            rebuild_timeout_ms: DEFAULT_REBUILD_TIMEOUT_MS,
            output: PathBuf::from("facetag-out.mp4"),
            output_format: None,
            output_width: DEFAULT_OUTPUT_WIDTH,
            output_height: DEFAULT_OUTPUT_HEIGHT,
            output_fps: DEFAULT_OUTPUT_FPS,
            label_font: None,
            show_fps: false,
            model: None,
        }
    }
}

impl OverlaySettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Requested capture size, only when both dimensions are set.
    pub fn capture_size(&self) -> Option<(u32, u32)> {
        self.capture_width.zip(self.capture_height)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |msg: String| Err(SettingsError::Invalid(msg));

        if self.source.trim().is_empty() {
            return invalid("source must not be empty".into());
        }
        if self.capture_width.is_some() != self.capture_height.is_some() {
            return invalid("capture width and height must be given together".into());
        }
        if self.sample_interval == 0 {
            return invalid("sample interval must be at least 1".into());
        }
        if self.refresh_interval == 0 {
            return invalid("refresh interval must be at least 1".into());
        }
        for (name, value) in [
            ("detection score", self.detection_score),
            ("min confidence", self.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be between 0.0 and 1.0, got {value}"));
            }
        }
        if !(self.match_distance > 0.0) {
            return invalid(format!(
                "match distance must be positive, got {}",
                self.match_distance
            ));
        }
        if self.validity_window_ms == 0 {
            return invalid("validity window must be positive".into());
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return invalid(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.jpeg_quality
            ));
        }
        if self.submit_mailbox == 0 {
            return invalid("submit mailbox must hold at least one record".into());
        }
        if self.output_width == 0 || self.output_height == 0 || self.output_fps == 0 {
            return invalid(format!(
                "output must be non-empty, got {}x{}@{}",
                self.output_width, self.output_height, self.output_fps
            ));
        }
        if self.rebuild_timeout_ms == 0 {
            return invalid("rebuild timeout must be positive".into());
        }
        if self.enrollment_flag.is_some() && self.rebuild_command.is_empty() {
            return invalid("an enrollment flag needs a rebuild command".into());
        }
        Ok(())
    }
}
