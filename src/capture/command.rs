//! Camera capture through external still-capture tools.
//!
//! USB cameras are read with `ffmpeg` from `/dev/videoN`; the Raspberry Pi
//! camera module with `rpicam-still`. Both write a PNG to stdout which is
//! decoded in-process.

use crate::capture::device::{DeviceHandle, ImagingDevice, Resolution};
use crate::error::{MeterError, Result};
use crate::exec::{CommandExecutor, SystemCommandExecutor};
use image::DynamicImage;
use std::path::PathBuf;

/// Capture tool used by a [`CommandDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBackend {
    /// `ffmpeg -f v4l2`
    V4l2,
    /// `rpicam-still`
    Libcamera,
}

impl CaptureBackend {
    pub fn command(&self) -> &'static str {
        match self {
            CaptureBackend::V4l2 => "ffmpeg",
            CaptureBackend::Libcamera => "rpicam-still",
        }
    }
}

/// Imaging device backed by an external capture command.
///
/// The tool only touches the camera when a frame is requested, so a failed
/// command before the first frame of a handle is reported as an open
/// failure for that index.
pub struct CommandDevice<E: CommandExecutor> {
    executor: E,
    backend: CaptureBackend,
    device_root: PathBuf,
    /// Index that has delivered a frame since it was last opened.
    streaming: Option<u32>,
}

impl CommandDevice<SystemCommandExecutor> {
    /// Create a device using the system command executor (production use).
    pub fn system(backend: CaptureBackend) -> Self {
        Self::new(SystemCommandExecutor::new(), backend)
    }
}

impl<E: CommandExecutor> CommandDevice<E> {
    /// Create a device with a custom executor (testing/library use).
    pub fn new(executor: E, backend: CaptureBackend) -> Self {
        Self {
            executor,
            backend,
            device_root: PathBuf::from("/dev"),
            streaming: None,
        }
    }

    /// Directory holding `videoN` nodes (defaults to `/dev`).
    pub fn with_device_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.device_root = root.into();
        self
    }

    fn video_node(&self, index: u32) -> PathBuf {
        self.device_root.join(format!("video{index}"))
    }

    /// Arguments for a single-frame capture to stdout.
    pub fn capture_args(&self, handle: &DeviceHandle) -> Vec<String> {
        let Resolution { width, height } = handle.resolution;
        match self.backend {
            CaptureBackend::V4l2 => vec![
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                "error".to_string(),
                "-f".to_string(),
                "v4l2".to_string(),
                "-video_size".to_string(),
                format!("{width}x{height}"),
                "-i".to_string(),
                self.video_node(handle.index).display().to_string(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-f".to_string(),
                "image2pipe".to_string(),
                "-vcodec".to_string(),
                "png".to_string(),
                "-".to_string(),
            ],
            CaptureBackend::Libcamera => vec![
                "-n".to_string(),
                "-t".to_string(),
                "1".to_string(),
                "--camera".to_string(),
                handle.index.to_string(),
                "--width".to_string(),
                width.to_string(),
                "--height".to_string(),
                height.to_string(),
                "-e".to_string(),
                "png".to_string(),
                "-o".to_string(),
                "-".to_string(),
            ],
        }
    }
}

impl<E: CommandExecutor> ImagingDevice for CommandDevice<E> {
    fn open(&mut self, index: u32, resolution: Resolution) -> Result<DeviceHandle> {
        if self.backend == CaptureBackend::V4l2 {
            let node = self.video_node(index);
            if !node.exists() {
                return Err(MeterError::CaptureOpenFailed {
                    index,
                    message: format!("{} does not exist", node.display()),
                });
            }
        }
        self.streaming = None;
        Ok(DeviceHandle { index, resolution })
    }

    fn read(&mut self, handle: &DeviceHandle) -> Result<Option<DynamicImage>> {
        let args = self.capture_args(handle);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let first_frame = self.streaming != Some(handle.index);
        let bytes = self
            .executor
            .execute(self.backend.command(), &arg_refs)
            .map_err(|e| {
                if first_frame {
                    MeterError::CaptureOpenFailed {
                        index: handle.index,
                        message: e.to_string(),
                    }
                } else {
                    MeterError::CaptureReadFailed {
                        message: e.to_string(),
                    }
                }
            })?;

        if bytes.is_empty() {
            return Ok(None);
        }

        let frame =
            image::load_from_memory(&bytes).map_err(|e| MeterError::CaptureReadFailed {
                message: format!("failed to decode frame: {e}"),
            })?;
        self.streaming = Some(handle.index);
        Ok(Some(frame))
    }

    fn release(&mut self, handle: DeviceHandle) {
        self.streaming = None;
        // Each capture command exits on its own; nothing stays open.
        log::trace!("{} released camera {}", self.backend.command(), handle.index);
    }

    fn name(&self) -> &'static str {
        match self.backend {
            CaptureBackend::V4l2 => "v4l2",
            CaptureBackend::Libcamera => "libcamera",
        }
    }
}
