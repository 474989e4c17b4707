//! Frame acquisition from imaging devices.

pub mod camera;
pub mod command;
pub mod device;
pub mod file;

pub use camera::{Camera, CaptureConfig, DeviceKind, capture_frame};
pub use command::{CaptureBackend, CommandDevice};
pub use device::{DeviceCounters, DeviceHandle, ImagingDevice, MockDevice, Resolution};
pub use file::FileDevice;

use crate::error::{MeterError, Result};

/// Build the production device for a capture configuration.
pub fn device_for(config: &CaptureConfig) -> Result<Box<dyn ImagingDevice>> {
    let device: Box<dyn ImagingDevice> = match config.device {
        DeviceKind::Auto | DeviceKind::Usb => Box::new(CommandDevice::system(CaptureBackend::V4l2)),
        DeviceKind::Picam => Box::new(CommandDevice::system(CaptureBackend::Libcamera)),
        DeviceKind::File => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| MeterError::ConfigInvalidValue {
                    key: "camera.path".to_string(),
                    message: "required when camera.device is 'file'".to_string(),
                })?;
            Box::new(FileDevice::new(path))
        }
    };
    Ok(device)
}
