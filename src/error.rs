//! Error types for meterread.

use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Capture,
    Extraction,
    Publish,
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Capture => "capture",
            Stage::Extraction => "extraction",
            Stage::Publish => "publish",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum MeterError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid resolution {width}x{height}: both dimensions must be positive")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Unknown threshold mode '{name}' (expected none, otsu or adaptive)")]
    UnknownThreshold { name: String },

    #[error("Invalid region of interest: {message}")]
    InvalidRoi { message: String },

    #[error(
        "Region of interest {x},{y} {width}x{height} exceeds frame bounds {frame_width}x{frame_height}"
    )]
    RoiOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    // Capture errors
    #[error("Unable to open camera at index {index}: {message}")]
    CaptureOpenFailed { index: u32, message: String },

    #[error("Failed to capture frame from camera: {message}")]
    CaptureReadFailed { message: String },

    // Recognition errors
    #[error("Text extraction failed: {message}")]
    Extraction { message: String },

    // Publishing errors
    #[error("Publishing failed: {message}")]
    Transport { message: String },

    // External command errors
    #[error("External tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("External command failed: {message}")]
    CommandFailed { message: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeterError {
    /// Stage the error is attributed to, used when reporting failures.
    pub fn stage(&self) -> Stage {
        match self {
            MeterError::ConfigFileNotFound { .. }
            | MeterError::ConfigInvalidValue { .. }
            | MeterError::Config(_)
            | MeterError::InvalidResolution { .. }
            | MeterError::UnknownThreshold { .. }
            | MeterError::InvalidRoi { .. }
            | MeterError::RoiOutOfBounds { .. } => Stage::Configuration,
            MeterError::CaptureOpenFailed { .. } | MeterError::CaptureReadFailed { .. } => {
                Stage::Capture
            }
            MeterError::Extraction { .. } => Stage::Extraction,
            MeterError::Transport { .. } => Stage::Publish,
            MeterError::Image(_)
            | MeterError::ToolNotFound { .. }
            | MeterError::CommandFailed { .. }
            | MeterError::Json(_)
            | MeterError::Io(_) => Stage::Output,
        }
    }

    /// Fatal errors describe static misconfiguration; retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        self.stage() == Stage::Configuration
    }
}

pub type Result<T> = std::result::Result<T, MeterError>;
