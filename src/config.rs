use crate::broker::BrokerConfig;
use crate::capture::{CaptureConfig, DeviceKind, Resolution};
use crate::defaults;
use crate::error::{MeterError, Result};
use crate::ocr::ExtractionConfig;
use crate::pipeline::PipelineConfig;
use crate::transform::{Roi, ThresholdMode, TransformConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub meter: MeterSection,
    pub camera: CameraSection,
    pub preprocess: PreprocessSection,
    pub cloud: CloudSection,
}

/// Meter identity and recognition settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeterSection {
    pub meter_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub ocr_psm: u32,
    pub ocr_oem: u32,
    pub whitelist_digits: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tesseract_cmd: Option<PathBuf>,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraSection {
    /// auto, usb, picam or file
    pub device: String,
    pub index: u32,
    /// [width, height]
    pub resolution: [u32; 2],
    /// Still image read when `device = "file"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Image transform configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessSection {
    pub grayscale: bool,
    pub denoise: bool,
    /// none, otsu or adaptive
    pub threshold: String,
    pub invert: bool,
    /// [x, y, width, height]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<[i64; 4]>,
}

/// Remote publishing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CloudSection {
    pub sink: SinkKind,
    pub mqtt: MqttSection,
}

/// Sink selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    None,
    Mqtt,
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub tls: bool,
}

impl Default for MeterSection {
    fn default() -> Self {
        Self {
            meter_id: defaults::METER_ID.to_string(),
            unit: None,
            ocr_psm: defaults::OCR_PSM,
            ocr_oem: defaults::OCR_OEM,
            whitelist_digits: true,
            tesseract_cmd: None,
        }
    }
}

impl Default for CameraSection {
    fn default() -> Self {
        let (width, height) = defaults::RESOLUTION;
        Self {
            device: "auto".to_string(),
            index: defaults::CAMERA_INDEX,
            resolution: [width, height],
            path: None,
        }
    }
}

impl Default for PreprocessSection {
    fn default() -> Self {
        Self {
            grayscale: true,
            denoise: true,
            threshold: ThresholdMode::Otsu.to_string(),
            invert: false,
            roi: None,
        }
    }
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: defaults::MQTT_HOST.to_string(),
            port: defaults::MQTT_PORT,
            topic: defaults::MQTT_TOPIC.to_string(),
            username: None,
            password: None,
            tls: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => anyhow::Error::new(MeterError::ConfigFileNotFound {
                path: path.display().to_string(),
            }),
            _ => anyhow::Error::new(e),
        })?;
        let config: Config = toml::from_str(&contents).map_err(MeterError::from)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if matches!(
                    e.downcast_ref::<MeterError>(),
                    Some(MeterError::ConfigFileNotFound { .. })
                ) =>
            {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - METERREAD_METER_ID → meter.meter_id
    /// - METERREAD_CAMERA_INDEX → camera.index
    /// - TESSERACT_CMD → meter.tesseract_cmd
    /// - MQTT_USERNAME → cloud.mqtt.username
    /// - MQTT_PASSWORD → cloud.mqtt.password
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(meter_id) = env_value("METERREAD_METER_ID") {
            self.meter.meter_id = meter_id;
        }

        if let Some(index) = env_value("METERREAD_CAMERA_INDEX") {
            match index.parse() {
                Ok(index) => self.camera.index = index,
                Err(_) => log::warn!("ignoring METERREAD_CAMERA_INDEX={index:?}: not an index"),
            }
        }

        if let Some(cmd) = env_value("TESSERACT_CMD") {
            self.meter.tesseract_cmd = Some(PathBuf::from(cmd));
        }

        if let Some(username) = env_value("MQTT_USERNAME") {
            self.cloud.mqtt.username = Some(username);
        }

        if let Some(password) = env_value("MQTT_PASSWORD") {
            self.cloud.mqtt.password = Some(password);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/meterread/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meterread")
            .join("config.toml")
    }

    /// Validate and convert into the typed pipeline configuration.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        let meter_id = self.meter.meter_id.trim();
        if meter_id.is_empty() {
            return Err(MeterError::ConfigInvalidValue {
                key: "meter.meter_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let device: DeviceKind = self.camera.device.parse()?;
        if device == DeviceKind::File && self.camera.path.is_none() {
            return Err(MeterError::ConfigInvalidValue {
                key: "camera.path".to_string(),
                message: "required when camera.device is 'file'".to_string(),
            });
        }
        let [width, height] = self.camera.resolution;

        let roi = self.preprocess.roi.map(Roi::from_signed).transpose()?;

        Ok(PipelineConfig {
            meter_id: meter_id.to_string(),
            unit: self.meter.unit.clone().filter(|u| !u.is_empty()),
            capture: CaptureConfig {
                device,
                index: self.camera.index,
                resolution: Resolution::new(width, height)?,
                path: self.camera.path.clone(),
            },
            transform: TransformConfig {
                grayscale: self.preprocess.grayscale,
                denoise: self.preprocess.denoise,
                threshold: self.preprocess.threshold.parse()?,
                invert: self.preprocess.invert,
                roi,
            },
            extraction: ExtractionConfig {
                psm: self.meter.ocr_psm,
                oem: self.meter.ocr_oem,
                whitelist_digits: self.meter.whitelist_digits,
                tesseract_cmd: self.meter.tesseract_cmd.clone(),
            },
        })
    }

    /// Broker settings when publishing is enabled (or forced).
    pub fn broker_config(&self, force_mqtt: bool) -> Option<BrokerConfig> {
        if !force_mqtt && self.cloud.sink != SinkKind::Mqtt {
            return None;
        }
        let mqtt = &self.cloud.mqtt;
        Some(BrokerConfig {
            host: mqtt.host.clone(),
            port: mqtt.port,
            topic: mqtt.topic.clone(),
            username: mqtt.username.clone(),
            password: mqtt.password.clone(),
            tls: mqtt.tls,
        })
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.cloud.mqtt.password.is_some() {
            shown.cloud.mqtt.password = Some("********".to_string());
        }
        shown
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Load `KEY=value` pairs from a `.env` file in the working directory or one
/// of its parents. Variables already set in the process keep their values.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => log::debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => log::warn!("ignoring .env: {e}"),
    }
}

/// Load a specific env file. Variables already set keep their values.
pub fn load_dotenv_from(path: &Path) -> anyhow::Result<()> {
    dotenvy::from_path(path)
        .map_err(|e| anyhow::anyhow!("loading {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_meterread_env() {
        remove_env("METERREAD_METER_ID");
        remove_env("METERREAD_CAMERA_INDEX");
        remove_env("TESSERACT_CMD");
        remove_env("MQTT_USERNAME");
        remove_env("MQTT_PASSWORD");
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.meter.meter_id, "UNKNOWN");
        assert_eq!(config.meter.unit, None);
        assert_eq!(config.meter.ocr_psm, 7);
        assert_eq!(config.meter.ocr_oem, 1);
        assert!(config.meter.whitelist_digits);

        assert_eq!(config.camera.device, "auto");
        assert_eq!(config.camera.index, 0);
        assert_eq!(config.camera.resolution, [1280, 720]);

        assert!(config.preprocess.grayscale);
        assert!(config.preprocess.denoise);
        assert_eq!(config.preprocess.threshold, "otsu");
        assert!(!config.preprocess.invert);
        assert_eq!(config.preprocess.roi, None);

        assert_eq!(config.cloud.sink, SinkKind::None);
        assert_eq!(config.cloud.mqtt.host, "localhost");
        assert_eq!(config.cloud.mqtt.port, 1883);
        assert_eq!(config.cloud.mqtt.topic, "iot/meters/UNKNOWN");
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_config(
            r#"
            [meter]
            meter_id = "WATER-01"
            unit = "m3"
            ocr_psm = 8
            ocr_oem = 3
            whitelist_digits = false
            tesseract_cmd = "/opt/tesseract/bin/tesseract"

            [camera]
            device = "picam"
            index = 2
            resolution = [640, 480]

            [preprocess]
            grayscale = true
            denoise = false
            threshold = "adaptive"
            invert = true
            roi = [10, 20, 300, 80]

            [cloud]
            sink = "mqtt"

            [cloud.mqtt]
            host = "broker.local"
            port = 8883
            topic = "iot/meters/WATER-01"
            username = "meter"
            tls = true
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.meter.meter_id, "WATER-01");
        assert_eq!(config.meter.unit.as_deref(), Some("m3"));
        assert_eq!(config.meter.ocr_psm, 8);
        assert_eq!(config.meter.ocr_oem, 3);
        assert!(!config.meter.whitelist_digits);
        assert_eq!(
            config.meter.tesseract_cmd,
            Some(PathBuf::from("/opt/tesseract/bin/tesseract"))
        );
        assert_eq!(config.camera.device, "picam");
        assert_eq!(config.camera.index, 2);
        assert_eq!(config.camera.resolution, [640, 480]);
        assert!(!config.preprocess.denoise);
        assert_eq!(config.preprocess.threshold, "adaptive");
        assert!(config.preprocess.invert);
        assert_eq!(config.preprocess.roi, Some([10, 20, 300, 80]));
        assert_eq!(config.cloud.sink, SinkKind::Mqtt);
        assert_eq!(config.cloud.mqtt.host, "broker.local");
        assert_eq!(config.cloud.mqtt.port, 8883);
        assert_eq!(config.cloud.mqtt.username.as_deref(), Some("meter"));
        assert_eq!(config.cloud.mqtt.password, None);
        assert!(config.cloud.mqtt.tls);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_config(
            r#"
            [meter]
            meter_id = "GAS-3"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.meter.meter_id, "GAS-3");
        assert_eq!(config.meter.ocr_psm, 7);
        assert_eq!(config.camera, CameraSection::default());
        assert_eq!(config.preprocess, PreprocessSection::default());
        assert_eq!(config.cloud, CloudSection::default());
    }

    #[test]
    fn test_env_override_meter_and_camera() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_meterread_env();

        set_env("METERREAD_METER_ID", "ELEC-9");
        set_env("METERREAD_CAMERA_INDEX", "1");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.meter.meter_id, "ELEC-9");
        assert_eq!(config.camera.index, 1);
        assert_eq!(config.meter.tesseract_cmd, None); // Not overridden

        clear_meterread_env();
    }

    #[test]
    fn test_env_override_tools_and_credentials() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_meterread_env();

        set_env("TESSERACT_CMD", "/usr/local/bin/tesseract");
        set_env("MQTT_USERNAME", "edge");
        set_env("MQTT_PASSWORD", "hunter2");
        let config = Config::default().with_env_overrides();

        assert_eq!(
            config.meter.tesseract_cmd,
            Some(PathBuf::from("/usr/local/bin/tesseract"))
        );
        assert_eq!(config.cloud.mqtt.username.as_deref(), Some("edge"));
        assert_eq!(config.cloud.mqtt.password.as_deref(), Some("hunter2"));

        clear_meterread_env();
    }

    #[test]
    fn test_dotenv_fills_unset_variables_only() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_meterread_env();

        let env_file = write_config(
            "METERREAD_METER_ID=FROM-FILE\nMQTT_USERNAME=edge\nMQTT_PASSWORD=from-file\n",
        );
        set_env("METERREAD_METER_ID", "FROM-PROCESS");

        load_dotenv_from(env_file.path()).unwrap();
        let config = Config::default().with_env_overrides();

        assert_eq!(config.meter.meter_id, "FROM-PROCESS");
        assert_eq!(config.cloud.mqtt.username.as_deref(), Some("edge"));
        assert_eq!(config.cloud.mqtt.password.as_deref(), Some("from-file"));

        clear_meterread_env();
    }

    #[test]
    fn test_dotenv_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dotenv_from(&dir.path().join(".env")).unwrap_err();
        assert!(err.to_string().contains(".env"));
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_meterread_env();

        set_env("METERREAD_METER_ID", "");
        set_env("TESSERACT_CMD", "");
        let config = Config::default().with_env_overrides();

        // Empty string should not override default
        assert_eq!(config.meter.meter_id, "UNKNOWN");
        assert_eq!(config.meter.tesseract_cmd, None);

        clear_meterread_env();
    }

    #[test]
    fn test_env_override_invalid_index_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_meterread_env();

        set_env("METERREAD_CAMERA_INDEX", "front");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.camera.index, 0);

        clear_meterread_env();
    }

    #[test]
    fn test_load_missing_file_is_config_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        let meter_err = err.downcast_ref::<MeterError>().unwrap();
        assert!(matches!(meter_err, MeterError::ConfigFileNotFound { .. }));
        assert!(meter_err.is_fatal());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_config(
            r#"
            [meter
            meter_id = "broken
        "#,
        );

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_negative_resolution_is_rejected_at_load() {
        let temp_file = write_config("[camera]\nresolution = [-1, 480]\n");
        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("meterread"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_fails_on_invalid_toml() {
        let temp_file = write_config("[camera\nindex = ");
        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_default_converts_to_default_pipeline_config() {
        let pipeline = Config::default().to_pipeline_config().unwrap();
        assert_eq!(pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_pipeline_config_carries_every_section() {
        let mut config = Config::default();
        config.meter.meter_id = "W1".to_string();
        config.meter.unit = Some("m3".to_string());
        config.camera.device = "usb".to_string();
        config.camera.resolution = [800, 600];
        config.preprocess.threshold = "adaptive".to_string();
        config.preprocess.roi = Some([1, 2, 30, 40]);
        config.meter.ocr_psm = 6;

        let pipeline = config.to_pipeline_config().unwrap();

        assert_eq!(pipeline.meter_id, "W1");
        assert_eq!(pipeline.unit.as_deref(), Some("m3"));
        assert_eq!(pipeline.capture.device, DeviceKind::Usb);
        assert_eq!(pipeline.capture.resolution.width, 800);
        assert_eq!(pipeline.transform.threshold, ThresholdMode::Adaptive);
        assert_eq!(
            pipeline.transform.roi,
            Some(Roi {
                x: 1,
                y: 2,
                width: 30,
                height: 40
            })
        );
        assert_eq!(pipeline.extraction.psm, 6);
    }

    #[test]
    fn test_unknown_threshold_is_fatal() {
        let mut config = Config::default();
        config.preprocess.threshold = "triangle".to_string();

        let err = config.to_pipeline_config().unwrap_err();

        assert!(matches!(err, MeterError::UnknownThreshold { ref name } if name == "triangle"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_zero_resolution_is_fatal() {
        let mut config = Config::default();
        config.camera.resolution = [0, 720];
        let err = config.to_pipeline_config().unwrap_err();
        assert!(matches!(err, MeterError::InvalidResolution { .. }));
    }

    #[test]
    fn test_negative_roi_is_fatal() {
        let mut config = Config::default();
        config.preprocess.roi = Some([-5, 0, 10, 10]);
        let err = config.to_pipeline_config().unwrap_err();
        assert!(matches!(err, MeterError::InvalidRoi { .. }));
    }

    #[test]
    fn test_unknown_device_is_fatal() {
        let mut config = Config::default();
        config.camera.device = "webcam".to_string();
        assert!(config.to_pipeline_config().unwrap_err().is_fatal());
    }

    #[test]
    fn test_file_device_requires_path() {
        let mut config = Config::default();
        config.camera.device = "file".to_string();
        let err = config.to_pipeline_config().unwrap_err();
        assert!(err.to_string().contains("camera.path"));

        config.camera.path = Some(PathBuf::from("/tmp/meter.png"));
        assert!(config.to_pipeline_config().is_ok());
    }

    #[test]
    fn test_broker_config_follows_sink_selection() {
        let mut config = Config::default();
        assert_eq!(config.broker_config(false), None);
        assert!(config.broker_config(true).is_some());

        config.cloud.sink = SinkKind::Mqtt;
        config.cloud.mqtt.topic = "iot/meters/W1".to_string();
        let broker = config.broker_config(false).unwrap();
        assert_eq!(broker.topic, "iot/meters/W1");
        assert_eq!(broker.port, 1883);
    }

    #[test]
    fn test_redacted_masks_password() {
        let mut config = Config::default();
        config.cloud.mqtt.password = Some("hunter2".to_string());

        let shown = config.redacted().to_toml().unwrap();

        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_toml_output_loads_back() {
        let mut config = Config::default();
        config.preprocess.roi = Some([0, 0, 100, 50]);
        config.cloud.sink = SinkKind::Mqtt;

        let temp_file = write_config(&config.to_toml().unwrap());

        assert_eq!(Config::load(temp_file.path()).unwrap(), config);
    }
}
