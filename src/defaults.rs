//! Default configuration constants for meterread.
//!
//! Shared between the TOML configuration layer and the typed pipeline
//! configuration so both agree on what "unset" means.

use std::time::Duration;

/// Meter identifier used when the configuration does not name one.
pub const METER_ID: &str = "UNKNOWN";

/// Default capture resolution (width, height) in pixels.
pub const RESOLUTION: (u32, u32) = (1280, 720);

/// Default camera index.
pub const CAMERA_INDEX: u32 = 0;

/// Tesseract page segmentation mode.
///
/// 7 treats the image as a single text line, which is what a cropped
/// meter display is.
pub const OCR_PSM: u32 = 7;

/// Tesseract engine mode (1 = LSTM only).
pub const OCR_OEM: u32 = 1;

/// Characters allowed when the digit whitelist is enabled.
pub const DIGIT_WHITELIST: &str = "0123456789.";

/// Tesseract executable looked up on `PATH` when no override is configured.
pub const TESSERACT_CMD: &str = "tesseract";

/// Neighborhood size for adaptive thresholding (odd, in pixels).
pub const ADAPTIVE_BLOCK_SIZE: u32 = 11;

/// Constant subtracted from the local mean in adaptive thresholding.
pub const ADAPTIVE_C: i32 = 2;

/// Interval between periodic readings.
pub const INTERVAL: Duration = Duration::from_secs(60);

/// First backoff step after a failed periodic iteration.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Upper bound on the backoff added after consecutive failures.
pub const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Debug artifact file names, overwritten on each run.
pub const DEBUG_RAW_FILE: &str = "raw.png";
pub const DEBUG_PROCESSED_FILE: &str = "processed.png";

/// MQTT broker defaults.
pub const MQTT_HOST: &str = "localhost";
pub const MQTT_PORT: u16 = 1883;
pub const MQTT_TOPIC: &str = "iot/meters/UNKNOWN";
pub const MQTT_KEEPALIVE_SECS: u32 = 30;
pub const MQTT_PUBLISH_CMD: &str = "mosquitto_pub";

/// CA directory handed to the publisher when TLS is enabled.
pub const TLS_CA_PATH: &str = "/etc/ssl/certs";
