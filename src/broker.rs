//! Publishing measurement records to an MQTT broker.
//!
//! The broker connection is delegated to the `mosquitto_pub` client through
//! the [`CommandExecutor`] seam, one invocation per record.

use crate::defaults;
use crate::error::{MeterError, Result};
use crate::exec::{CommandExecutor, SystemCommandExecutor};
use crate::pipeline::sink::ResultSink;
use crate::pipeline::types::MeasurementRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// MQTT quality of service used for every record (at-least-once).
pub const QOS_AT_LEAST_ONCE: u8 = 1;

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Verify the broker against the system CA store
    pub tls: bool,
}

impl Default for BrokerConfig {
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

/// Trait for delivering one payload to a broker topic.
pub trait BrokerTransport: Send + Sync {
    fn send(&self, topic: &str, payload: &str, qos: u8) -> Result<()>;

    fn name(&self) -> &'static str {
        "transport"
    }
}

impl<T: BrokerTransport + ?Sized> BrokerTransport for Arc<T> {
    fn send(&self, topic: &str, payload: &str, qos: u8) -> Result<()> {
        (**self).send(topic, payload, qos)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Private config directory holding a `mosquitto_pub` options file.
///
/// `mosquitto_pub` loads `$XDG_CONFIG_HOME/mosquitto_pub` before parsing its
/// command line, so the password is handed over without appearing in the
/// process list. The directory is removed on drop.
struct OptionsDir {
    dir: TempDir,
}

impl OptionsDir {
    fn with_password(password: &str) -> Result<Self> {
        if password.contains(['\n', '\r']) {
            return Err(MeterError::Transport {
                message: "MQTT password must not contain line breaks".to_string(),
            });
        }
        let dir = tempfile::Builder::new()
            .prefix("meterread-mqtt-")
            .tempdir()?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(dir.path().join(defaults::MQTT_PUBLISH_CMD))?;
        writeln!(file, "-P {password}")?;
        Ok(Self { dir })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Transport that runs `mosquitto_pub` for each message.
pub struct MosquittoTransport<E: CommandExecutor> {
    executor: E,
    config: BrokerConfig,
}

impl MosquittoTransport<SystemCommandExecutor> {
    /// Create a transport with the system executor (production use).
    pub fn system(config: BrokerConfig) -> Self {
        Self::new(SystemCommandExecutor::new(), config)
    }
}

impl<E: CommandExecutor> MosquittoTransport<E> {
    /// Create a transport with a custom executor (testing/library use).
    pub fn new(executor: E, config: BrokerConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Command-line arguments for publishing `payload` to `topic`.
    ///
    /// The password is not part of these; see [`BrokerTransport::send`].
    pub fn publish_args(&self, topic: &str, payload: &str, qos: u8) -> Vec<String> {
        let mut args = vec![
            "-h".to_string(),
            self.config.host.clone(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-k".to_string(),
            defaults::MQTT_KEEPALIVE_SECS.to_string(),
            "-t".to_string(),
            topic.to_string(),
            "-q".to_string(),
            qos.to_string(),
        ];
        if let Some(username) = &self.config.username {
            args.push("-u".to_string());
            args.push(username.clone());
        }
        if self.config.tls {
            args.push("--capath".to_string());
            args.push(defaults::TLS_CA_PATH.to_string());
        }
        args.push("-m".to_string());
        args.push(payload.to_string());
        args
    }

    /// Password to hand to the client. Only meaningful with a username.
    fn password(&self) -> Option<&str> {
        self.config
            .username
            .as_ref()
            .and(self.config.password.as_deref())
    }
}

impl<E: CommandExecutor> BrokerTransport for MosquittoTransport<E> {
    fn send(&self, topic: &str, payload: &str, qos: u8) -> Result<()> {
        let args = self.publish_args(topic, payload, qos);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let options = self
            .password()
            .map(OptionsDir::with_password)
            .transpose()
            .map_err(|e| match e {
                MeterError::Transport { .. } => e,
                other => MeterError::Transport {
                    message: format!("failed to write MQTT options file: {other}"),
                },
            })?;
        let env: Vec<(&str, &std::ffi::OsStr)> = options
            .iter()
            .map(|dir| ("XDG_CONFIG_HOME", dir.path().as_os_str()))
            .collect();
        self.executor
            .execute_with_env(defaults::MQTT_PUBLISH_CMD, &arg_refs, &env)
            .map_err(|e| MeterError::Transport {
                message: format!(
                    "{}:{} topic {}: {}",
                    self.config.host, self.config.port, topic, e
                ),
            })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mosquitto"
    }
}

/// Sink that publishes each record as JSON to one topic at QoS 1.
pub struct BrokerSink<T: BrokerTransport> {
    transport: T,
    topic: String,
}

impl BrokerSink<MosquittoTransport<SystemCommandExecutor>> {
    pub fn mosquitto(config: BrokerConfig) -> Self {
        let topic = config.topic.clone();
        Self::new(MosquittoTransport::system(config), topic)
    }
}

impl<T: BrokerTransport> BrokerSink<T> {
    pub fn new(transport: T, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<T: BrokerTransport> ResultSink for BrokerSink<T> {
    fn publish(&self, record: &MeasurementRecord) -> Result<()> {
        let payload = record.to_json().map_err(|e| MeterError::Transport {
            message: format!("failed to encode record: {e}"),
        })?;
        self.transport
            .send(&self.topic, &payload, QOS_AT_LEAST_ONCE)
            .map_err(|e| match e {
                MeterError::Transport { .. } => e,
                other => MeterError::Transport {
                    message: other.to_string(),
                },
            })?;
        log::debug!(
            "published {} to {} via {}",
            record.meter_id,
            self.topic,
            self.transport.name()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandExecutor;
    use std::sync::Mutex;

    fn record() -> MeasurementRecord {
        MeasurementRecord {
            meter_id: "GAS-7".to_string(),
            reading: Some(1042.25),
            unit: Some("m3".to_string()),
            timestamp: "2024-01-01T00:00:00.000000Z".to_string(),
            raw_text: "1042,25 m3".to_string(),
        }
    }

    /// Transport that records what it was asked to send.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String, u8)>>,
        fail: bool,
    }

    impl BrokerTransport for RecordingTransport {
        fn send(&self, topic: &str, payload: &str, qos: u8) -> Result<()> {
            if self.fail {
                return Err(MeterError::CommandFailed {
                    message: "connection refused".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string(), qos));
            Ok(())
        }
    }

    #[test]
    fn test_broker_config_default() {
        let config = BrokerConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic, "iot/meters/UNKNOWN");
        assert!(!config.tls);
    }

    #[test]
    fn test_publish_args_minimal() {
        let transport = MosquittoTransport::new(MockCommandExecutor::new(), BrokerConfig::default());
        let args = transport.publish_args("iot/meters/A", "{}", 1);
        assert_eq!(
            args,
            vec![
                "-h",
                "localhost",
                "-p",
                "1883",
                "-k",
                "30",
                "-t",
                "iot/meters/A",
                "-q",
                "1",
                "-m",
                "{}"
            ]
        );
    }

    #[test]
    fn test_publish_args_with_credentials_and_tls() {
        let config = BrokerConfig {
            host: "broker.example.net".to_string(),
            port: 8883,
            username: Some("meter".to_string()),
            password: Some("s3cret".to_string()),
            tls: true,
            ..BrokerConfig::default()
        };
        let transport = MosquittoTransport::new(MockCommandExecutor::new(), config);
        let args = transport.publish_args("t", "p", 1);

        let joined = args.join(" ");
        assert!(joined.contains("-h broker.example.net -p 8883"));
        assert!(joined.contains("-u meter"));
        assert!(!args.iter().any(|a| a == "-P" || a.contains("s3cret")));
        assert!(joined.contains("--capath /etc/ssl/certs"));
        assert_eq!(args[args.len() - 2..], ["-m", "p"]);
    }

    #[test]
    fn test_password_without_username_is_not_sent() {
        let executor = Arc::new(MockCommandExecutor::new());
        let config = BrokerConfig {
            password: Some("orphan".to_string()),
            ..BrokerConfig::default()
        };
        let transport = MosquittoTransport::new(Arc::clone(&executor), config);

        transport.send("t", "p", 1).unwrap();

        let (_, args) = executor.call(0).unwrap();
        assert!(!args.iter().any(|a| a == "-P" || a == "orphan"));
        assert!(executor.env(0).unwrap().is_empty());
    }

    /// Executor that reads the options file while the publisher would run.
    #[derive(Default)]
    struct OptionsFileReader {
        seen: Mutex<Option<(std::path::PathBuf, String, u32)>>,
    }

    impl CommandExecutor for OptionsFileReader {
        fn execute_with_env(
            &self,
            _command: &str,
            _args: &[&str],
            env: &[(&str, &std::ffi::OsStr)],
        ) -> Result<Vec<u8>> {
            let (_, dir) = env
                .iter()
                .find(|(key, _)| *key == "XDG_CONFIG_HOME")
                .unwrap();
            let path = Path::new(dir).join("mosquitto_pub");
            let contents = std::fs::read_to_string(&path).unwrap();
            #[cfg(unix)]
            let mode = {
                use std::os::unix::fs::PermissionsExt;
                std::fs::metadata(&path).unwrap().permissions().mode() & 0o777
            };
            #[cfg(not(unix))]
            let mode = 0o600;
            *self.seen.lock().unwrap() = Some((path, contents, mode));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_password_goes_through_private_options_file() {
        let executor = Arc::new(OptionsFileReader::default());
        let config = BrokerConfig {
            username: Some("meter".to_string()),
            password: Some("s3cret".to_string()),
            ..BrokerConfig::default()
        };
        let transport = MosquittoTransport::new(Arc::clone(&executor), config);

        transport.send("t", "p", 1).unwrap();

        let (path, contents, mode) = executor.seen.lock().unwrap().clone().unwrap();
        assert_eq!(contents, "-P s3cret\n");
        assert_eq!(mode, 0o600);
        assert!(!path.exists(), "options file outlived the publish");
    }

    #[test]
    fn test_password_with_line_break_is_rejected() {
        let executor = Arc::new(MockCommandExecutor::new());
        let config = BrokerConfig {
            username: Some("meter".to_string()),
            password: Some("a\n-h evil".to_string()),
            ..BrokerConfig::default()
        };
        let transport = MosquittoTransport::new(Arc::clone(&executor), config);

        let err = transport.send("t", "p", 1).unwrap_err();

        assert!(matches!(err, MeterError::Transport { .. }));
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn test_mosquitto_transport_runs_publisher() {
        let executor = Arc::new(MockCommandExecutor::new().with_response(""));
        let transport = MosquittoTransport::new(Arc::clone(&executor), BrokerConfig::default());

        transport.send("iot/meters/X", "{\"a\":1}", 1).unwrap();

        let (command, args) = executor.call(0).unwrap();
        assert_eq!(command, "mosquitto_pub");
        assert!(args.contains(&"{\"a\":1}".to_string()));
    }

    #[test]
    fn test_mosquitto_failure_is_transport_error() {
        let executor = MockCommandExecutor::new().with_error(MeterError::ToolNotFound {
            tool: "mosquitto_pub".to_string(),
        });
        let transport = MosquittoTransport::new(executor, BrokerConfig::default());

        let err = transport.send("t", "p", 1).unwrap_err();

        assert!(matches!(err, MeterError::Transport { .. }));
        assert!(err.to_string().contains("localhost:1883"));
    }

    #[test]
    fn test_broker_sink_publishes_json_at_least_once() {
        let transport = Arc::new(RecordingTransport::default());
        let sink = BrokerSink::new(Arc::clone(&transport), "iot/meters/GAS-7");

        sink.publish(&record()).unwrap();

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let (topic, payload, qos) = &sent[0];
        assert_eq!(topic, "iot/meters/GAS-7");
        assert_eq!(*qos, 1);
        let decoded: MeasurementRecord = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded, record());
    }

    #[test]
    fn test_broker_sink_wraps_failures_as_transport() {
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let sink = BrokerSink::new(transport, "t");

        let err = sink.publish(&record()).unwrap_err();

        assert!(matches!(err, MeterError::Transport { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_broker_sink_name() {
        let sink = BrokerSink::mosquitto(BrokerConfig::default());
        assert_eq!(sink.name(), "mqtt");
        assert_eq!(sink.topic(), "iot/meters/UNKNOWN");
    }
}
