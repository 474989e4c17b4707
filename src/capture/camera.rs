//! Scoped frame acquisition on top of an [`ImagingDevice`].

use crate::capture::device::{DeviceHandle, ImagingDevice, Resolution};
use crate::defaults;
use crate::error::{MeterError, Result};
use image::DynamicImage;
use std::path::PathBuf;
use std::str::FromStr;

/// Which kind of imaging device to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    /// USB camera through V4L2.
    #[default]
    Auto,
    Usb,
    /// Raspberry Pi camera module through libcamera.
    Picam,
    /// Still image from disk.
    File,
}

impl FromStr for DeviceKind {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(DeviceKind::Auto),
            "usb" => Ok(DeviceKind::Usb),
            "picam" => Ok(DeviceKind::Picam),
            "file" => Ok(DeviceKind::File),
            other => Err(MeterError::ConfigInvalidValue {
                key: "camera.device".to_string(),
                message: format!("unknown device '{other}' (expected auto, usb, picam or file)"),
            }),
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceKind::Auto => "auto",
            DeviceKind::Usb => "usb",
            DeviceKind::Picam => "picam",
            DeviceKind::File => "file",
        };
        f.write_str(name)
    }
}

/// Camera configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub device: DeviceKind,
    pub index: u32,
    pub resolution: Resolution,
    /// Image path for [`DeviceKind::File`].
    pub path: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let (width, height) = defaults::RESOLUTION;
        Self {
            device: DeviceKind::Auto,
            index: defaults::CAMERA_INDEX,
            resolution: Resolution { width, height },
            path: None,
        }
    }
}

/// A camera bound to one device.
///
/// The device is released when the camera is closed or dropped, whichever
/// comes first, so every exit path out of a capture gives the device back.
pub struct Camera<'d> {
    device: &'d mut dyn ImagingDevice,
    config: CaptureConfig,
    handle: Option<DeviceHandle>,
}

impl<'d> Camera<'d> {
    pub fn new(device: &'d mut dyn ImagingDevice, config: CaptureConfig) -> Self {
        Self {
            device,
            config,
            handle: None,
        }
    }

    /// Acquire the device and apply the configured resolution.
    pub fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let index = self.config.index;
        let resolution = Resolution::new(
            self.config.resolution.width,
            self.config.resolution.height,
        )?;
        let handle = self
            .device
            .open(index, resolution)
            .map_err(|e| match e {
                MeterError::CaptureOpenFailed { .. } => e,
                other => MeterError::CaptureOpenFailed {
                    index,
                    message: other.to_string(),
                },
            })?;
        log::debug!(
            "opened {} camera {} at {}",
            self.device.name(),
            index,
            resolution
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Capture one frame, opening the device first if needed.
    pub fn capture(&mut self) -> Result<DynamicImage> {
        self.open()?;
        let Some(handle) = self.handle.as_ref() else {
            return Err(MeterError::CaptureOpenFailed {
                index: self.config.index,
                message: "device handle missing after open".to_string(),
            });
        };

        let frame = self.device.read(handle).map_err(|e| match e {
            MeterError::CaptureReadFailed { .. } | MeterError::CaptureOpenFailed { .. } => e,
            other => MeterError::CaptureReadFailed {
                message: other.to_string(),
            },
        })?;

        match frame {
            Some(frame) if frame.width() > 0 && frame.height() > 0 => Ok(frame),
            Some(_) => Err(MeterError::CaptureReadFailed {
                message: "device returned an empty frame".to_string(),
            }),
            None => Err(MeterError::CaptureReadFailed {
                message: "device returned no frame".to_string(),
            }),
        }
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("releasing {} camera {}", self.device.name(), handle.index);
            self.device.release(handle);
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Camera<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the device, capture one frame and release the device again.
pub fn capture_frame(
    device: &mut dyn ImagingDevice,
    config: &CaptureConfig,
) -> Result<DynamicImage> {
    let mut camera = Camera::new(device, config.clone());
    camera.open()?;
    camera.capture()
}
