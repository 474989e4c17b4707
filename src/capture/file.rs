//! Still-image file source for offline runs.

use crate::capture::device::{DeviceHandle, ImagingDevice, Resolution};
use crate::error::{MeterError, Result};
use image::DynamicImage;
use std::path::PathBuf;

/// Imaging device that reads a still image from disk on every capture.
///
/// The configured resolution is not applied; the image is used as stored.
#[derive(Debug, Clone)]
pub struct FileDevice {
    path: PathBuf,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImagingDevice for FileDevice {
    fn open(&mut self, index: u32, resolution: Resolution) -> Result<DeviceHandle> {
        if !self.path.is_file() {
            return Err(MeterError::CaptureOpenFailed {
                index,
                message: format!("{} is not a readable file", self.path.display()),
            });
        }
        Ok(DeviceHandle { index, resolution })
    }

    fn read(&mut self, _handle: &DeviceHandle) -> Result<Option<DynamicImage>> {
        let frame = image::open(&self.path).map_err(|e| MeterError::CaptureReadFailed {
            message: format!("{}: {e}", self.path.display()),
        })?;
        Ok(Some(frame))
    }

    fn release(&mut self, _handle: DeviceHandle) {}

    fn name(&self) -> &'static str {
        "file"
    }
}
