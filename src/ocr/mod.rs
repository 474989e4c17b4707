//! Text extraction through an external recognition engine.

pub mod recognizer;
pub mod tesseract;

pub use recognizer::{ExtractionConfig, MockRecognizer, RecognizeArgs, TextRecognizer};
pub use tesseract::TesseractRecognizer;

use crate::error::{MeterError, Result};
use image::GrayImage;

/// Run the recognizer over a prepared image and trim the result.
///
/// No parsing happens here. Any engine failure is reported as
/// [`MeterError::Extraction`].
pub fn extract_text(
    recognizer: &dyn TextRecognizer,
    image: &GrayImage,
    config: &ExtractionConfig,
) -> Result<String> {
    let args = config.recognize_args();
    let raw = recognizer.recognize(image, &args).map_err(|e| match e {
        MeterError::Extraction { .. } => e,
        other => MeterError::Extraction {
            message: other.to_string(),
        },
    })?;
    let text = raw.trim().to_string();
    log::debug!("{} recognized {:?}", recognizer.engine_name(), text);
    Ok(text)
}
