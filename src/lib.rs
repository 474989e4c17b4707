//! meterread - Read utility meter displays from a camera
//!
//! Captures a still frame, prepares it for recognition, extracts the digits
//! with an OCR engine and parses them into a timestamped reading that can be
//! published to an MQTT broker.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod broker;
pub mod capture;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod ocr;
pub mod parse;
pub mod pipeline;
pub mod transform;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Core traits (source → process → sink)
pub use capture::ImagingDevice;
pub use exec::{CommandExecutor, SystemCommandExecutor};
pub use ocr::TextRecognizer;
pub use pipeline::sink::{CollectorSink, NullSink, ResultSink};

// Pipeline
pub use parse::{ParsedReading, parse_reading};
pub use pipeline::orchestrator::{MeterPipeline, PipelineConfig};
pub use pipeline::types::MeasurementRecord;

// Error handling
pub use error::{MeterError, Result, Stage};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
