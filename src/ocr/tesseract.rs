//! Tesseract command-line engine.

use crate::defaults;
use crate::error::{MeterError, Result};
use crate::exec::{CommandExecutor, SystemCommandExecutor};
use crate::ocr::recognizer::{ExtractionConfig, RecognizeArgs, TextRecognizer};
use image::{GrayImage, ImageFormat};

/// Recognizer that shells out to the `tesseract` executable.
///
/// The image is written to a temporary PNG and tesseract prints the text to
/// stdout.
pub struct TesseractRecognizer<E: CommandExecutor> {
    executor: E,
    command: String,
}

impl TesseractRecognizer<SystemCommandExecutor> {
    /// Create a recognizer for the configured executable (production use).
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let command = config
            .tesseract_cmd
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| defaults::TESSERACT_CMD.to_string());
        Self::new(SystemCommandExecutor::new(), command)
    }
}

impl<E: CommandExecutor> TesseractRecognizer<E> {
    /// Create a recognizer with a custom executor (testing/library use).
    pub fn new(executor: E, command: impl Into<String>) -> Self {
        Self {
            executor,
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Command-line arguments following the input image path.
    pub fn engine_args(args: &RecognizeArgs) -> Vec<String> {
        let mut out = vec![
            "stdout".to_string(),
            "--psm".to_string(),
            args.psm.to_string(),
            "--oem".to_string(),
            args.oem.to_string(),
        ];
        if let Some(whitelist) = &args.whitelist {
            out.push("-c".to_string());
            out.push(format!("tessedit_char_whitelist={whitelist}"));
        }
        out
    }
}

impl<E: CommandExecutor> TextRecognizer for TesseractRecognizer<E> {
    fn recognize(&self, image: &GrayImage, args: &RecognizeArgs) -> Result<String> {
        let input = tempfile::Builder::new()
            .prefix("meterread-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| MeterError::Extraction {
                message: format!("failed to create temporary image: {e}"),
            })?;
        image
            .save_with_format(input.path(), ImageFormat::Png)
            .map_err(|e| MeterError::Extraction {
                message: format!("failed to write temporary image: {e}"),
            })?;

        let input_path = input.path().display().to_string();
        let mut all_args = vec![input_path];
        all_args.extend(Self::engine_args(args));
        let arg_refs: Vec<&str> = all_args.iter().map(String::as_str).collect();

        let stdout = self
            .executor
            .execute(&self.command, &arg_refs)
            .map_err(|e| MeterError::Extraction {
                message: format!("{} ({}): {e}", self.command, args_summary(args)),
            })?;

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn engine_name(&self) -> &str {
        "tesseract"
    }
}

fn args_summary(args: &RecognizeArgs) -> String {
    format!("psm {}, oem {}", args.psm, args.oem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandExecutor;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn digits_args() -> RecognizeArgs {
        ExtractionConfig::default().recognize_args()
    }

    #[test]
    fn test_engine_args_with_whitelist() {
        let args = TesseractRecognizer::<MockCommandExecutor>::engine_args(&digits_args());
        assert_eq!(
            args,
            vec![
                "stdout",
                "--psm",
                "7",
                "--oem",
                "1",
                "-c",
                "tessedit_char_whitelist=0123456789."
            ]
        );
    }

    #[test]
    fn test_engine_args_without_whitelist() {
        let args = TesseractRecognizer::<MockCommandExecutor>::engine_args(&RecognizeArgs {
            psm: 8,
            oem: 3,
            whitelist: None,
        });
        assert_eq!(args, vec!["stdout", "--psm", "8", "--oem", "3"]);
    }

    #[test]
    fn test_recognize_passes_png_path_and_returns_stdout() {
        let executor = Arc::new(MockCommandExecutor::new().with_response("00123.4\n"));
        let recognizer = TesseractRecognizer::new(Arc::clone(&executor), "tesseract");

        let text = recognizer
            .recognize(&GrayImage::new(12, 6), &digits_args())
            .unwrap();

        assert_eq!(text, "00123.4\n");
        let (command, args) = executor.call(0).unwrap();
        assert_eq!(command, "tesseract");
        assert!(args[0].ends_with(".png"));
        assert_eq!(args[1], "stdout");
    }

    #[test]
    fn test_temporary_image_is_removed_after_recognition() {
        let executor = Arc::new(MockCommandExecutor::new());
        let recognizer = TesseractRecognizer::new(Arc::clone(&executor), "tesseract");

        recognizer
            .recognize(&GrayImage::new(2, 2), &digits_args())
            .unwrap();

        let (_, args) = executor.call(0).unwrap();
        assert!(!PathBuf::from(&args[0]).exists());
    }

    #[test]
    fn test_engine_failure_is_extraction_error() {
        let executor = MockCommandExecutor::new().with_error(MeterError::ToolNotFound {
            tool: "/opt/tess/bin/tesseract".to_string(),
        });
        let recognizer = TesseractRecognizer::new(executor, "/opt/tess/bin/tesseract");

        let err = recognizer
            .recognize(&GrayImage::new(2, 2), &digits_args())
            .unwrap_err();

        assert!(matches!(err, MeterError::Extraction { .. }));
        assert!(err.to_string().contains("/opt/tess/bin/tesseract"));
    }

    #[test]
    fn test_from_config_uses_override() {
        let config = ExtractionConfig {
            tesseract_cmd: Some(PathBuf::from("/usr/local/bin/tesseract5")),
            ..ExtractionConfig::default()
        };
        assert_eq!(
            TesseractRecognizer::from_config(&config).command(),
            "/usr/local/bin/tesseract5"
        );
        assert_eq!(
            TesseractRecognizer::from_config(&ExtractionConfig::default()).command(),
            "tesseract"
        );
    }
}
