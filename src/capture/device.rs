use crate::error::{MeterError, Result};
use image::DynamicImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Requested capture resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Create a resolution, rejecting zero dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MeterError::InvalidResolution { width, height });
        }
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opened device, returned by [`ImagingDevice::open`].
///
/// Consumed by [`ImagingDevice::release`], so a handle cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    pub index: u32,
    pub resolution: Resolution,
}

/// Trait for still-image devices.
///
/// This trait allows swapping implementations (real camera vs file vs mock).
pub trait ImagingDevice: Send {
    /// Acquire the device at `index` and configure it for `resolution`.
    fn open(&mut self, index: u32, resolution: Resolution) -> Result<DeviceHandle>;

    /// Grab one frame. `Ok(None)` means the device produced nothing.
    fn read(&mut self, handle: &DeviceHandle) -> Result<Option<DynamicImage>>;

    /// Release the device.
    fn release(&mut self, handle: DeviceHandle);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "device"
    }
}

/// Shared open/release counters, observable after the device has moved.
#[derive(Debug, Clone, Default)]
pub struct DeviceCounters {
    opens: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl DeviceCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Number of handles currently held.
    pub fn outstanding(&self) -> usize {
        self.opens().saturating_sub(self.releases())
    }
}

/// Mock imaging device for testing
#[derive(Debug, Clone)]
pub struct MockDevice {
    frame: Option<DynamicImage>,
    should_fail_open: bool,
    should_fail_read: bool,
    counters: DeviceCounters,
}

impl MockDevice {
    /// Create a mock device that returns `frame` on every read.
    pub fn new(frame: DynamicImage) -> Self {
        Self {
            frame: Some(frame),
            should_fail_open: false,
            should_fail_read: false,
            counters: DeviceCounters::default(),
        }
    }

    /// Create a mock device whose reads yield no frame.
    pub fn empty() -> Self {
        Self {
            frame: None,
            should_fail_open: false,
            should_fail_read: false,
            counters: DeviceCounters::default(),
        }
    }

    /// Configure the mock to fail on open
    pub fn with_open_failure(mut self) -> Self {
        self.should_fail_open = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Counters shared with every clone of this mock.
    pub fn counters(&self) -> DeviceCounters {
        self.counters.clone()
    }
}

impl ImagingDevice for MockDevice {
    fn open(&mut self, index: u32, resolution: Resolution) -> Result<DeviceHandle> {
        if self.should_fail_open {
            return Err(MeterError::CaptureOpenFailed {
                index,
                message: "mock device unavailable".to_string(),
            });
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceHandle { index, resolution })
    }

    fn read(&mut self, _handle: &DeviceHandle) -> Result<Option<DynamicImage>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_read {
            return Err(MeterError::CaptureReadFailed {
                message: "mock read failure".to_string(),
            });
        }
        Ok(self.frame.clone())
    }

    fn release(&mut self, _handle: DeviceHandle) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
