use crate::defaults;
use crate::error::{MeterError, Result};
use image::GrayImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

/// Tuning passed to the recognition engine for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizeArgs {
    /// Page segmentation mode
    pub psm: u32,
    /// Engine mode
    pub oem: u32,
    /// Restrict recognition to these characters
    pub whitelist: Option<String>,
}

/// Trait for optical character recognition engines.
///
/// This trait allows swapping implementations (real tesseract vs mock).
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in a single-channel image.
    ///
    /// Returns the engine output as-is; callers trim and parse it.
    fn recognize(&self, image: &GrayImage, args: &RecognizeArgs) -> Result<String>;

    /// Name of the engine, for logging.
    fn engine_name(&self) -> &str;
}

/// Implement TextRecognizer for Arc<T> to allow sharing across runs.
impl<T: TextRecognizer + ?Sized> TextRecognizer for Arc<T> {
    fn recognize(&self, image: &GrayImage, args: &RecognizeArgs) -> Result<String> {
        (**self).recognize(image, args)
    }

    fn engine_name(&self) -> &str {
        (**self).engine_name()
    }
}

/// Configuration for text extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub psm: u32,
    pub oem: u32,
    pub whitelist_digits: bool,
    /// Engine executable override
    pub tesseract_cmd: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            psm: defaults::OCR_PSM,
            oem: defaults::OCR_OEM,
            whitelist_digits: true,
            tesseract_cmd: None,
        }
    }
}

impl ExtractionConfig {
    /// Engine arguments derived from this configuration.
    pub fn recognize_args(&self) -> RecognizeArgs {
        RecognizeArgs {
            psm: self.psm,
            oem: self.oem,
            whitelist: self
                .whitelist_digits
                .then(|| defaults::DIGIT_WHITELIST.to_string()),
        }
    }
}

/// Mock recognizer for testing
#[derive(Debug, Default)]
pub struct MockRecognizer {
    response: String,
    should_fail: bool,
    calls: Mutex<Vec<(u32, u32, RecognizeArgs)>>,
}

impl MockRecognizer {
    /// Create a new mock recognizer that returns `response`
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            ..Self::default()
        }
    }

    /// Configure the mock to fail on recognize
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Recorded calls as (image width, image height, args).
    pub fn calls(&self) -> Vec<(u32, u32, RecognizeArgs)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl TextRecognizer for MockRecognizer {
    fn recognize(&self, image: &GrayImage, args: &RecognizeArgs) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((image.width(), image.height(), args.clone()));
        }
        if self.should_fail {
            Err(MeterError::Extraction {
                message: "mock recognition failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn engine_name(&self) -> &str {
        "mock"
    }
}
