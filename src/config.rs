use crate::{Error, Result};
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const BROKER_ADDRESSES: &str = "broker.addresses";
pub const CLIENT_ID: &str = "client.id";
pub const COMPRESSION_CODEC: &str = "compression.codec";
pub const MESSAGE_TIMEOUT_MS: &str = "message.timeout.ms";

/// Keys that must carry a value when the connection is opened.
pub const REQUIRED_KEYS: [&str; 4] = [BROKER_ADDRESSES, CLIENT_ID, COMPRESSION_CODEC, MESSAGE_TIMEOUT_MS];

/// Broker-list spellings accepted from callers and folded into `broker.addresses`.
const BROKER_ALIASES: [&str; 2] = ["metadata.broker.list", "bootstrap.servers"];

const COMPRESSION_CODECS: [&str; 5] = ["none", "gzip", "snappy", "lz4", "zstd"];

/// Producer configuration: option name to string value.
///
/// Built from the defaults with caller overrides merged on top, last write
/// wins. Keys this crate does not know about are kept and handed to the broker
/// client untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProducerConfig {
    options: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    producer: BTreeMap<String, toml::Value>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        let options = [
            (BROKER_ADDRESSES, default_broker_addresses()),
            (CLIENT_ID, default_client_id()),
            (COMPRESSION_CODEC, default_compression()),
            (MESSAGE_TIMEOUT_MS, default_message_timeout_ms()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        Self { options }
    }
}

impl ProducerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `overrides` merged on top.
    pub fn with_overrides<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::default();
        config.merge(overrides);
        config
    }

    /// Loads defaults, then the `[producer]` table of a TOML file.
    ///
    /// ```toml
    /// [producer]
    /// "broker.addresses" = "kafka-1:9092,kafka-2:9092"
    /// "client.id" = "orders-service"
    /// "message.timeout.ms" = 3000
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;

        let mut overrides = Vec::with_capacity(file.producer.len());
        for (key, value) in file.producer {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(Error::Config(format!(
                        "option '{}' must be a string, number or boolean, got {}",
                        key,
                        other.type_str()
                    )))
                }
            };
            overrides.push((key, value));
        }

        Ok(Self::with_overrides(overrides))
    }

    pub fn merge<I, K, V>(&mut self, overrides: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in overrides {
            self.set(key, value);
        }
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let key = if BROKER_ALIASES.contains(&key.as_str()) {
            BROKER_ADDRESSES.to_string()
        } else {
            key
        };
        self.options.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn broker_addresses(&self) -> Vec<&str> {
        self.get(BROKER_ADDRESSES)
            .map(|list| list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.get(CLIENT_ID)
    }

    /// Per-attempt delivery deadline taken from `message.timeout.ms`.
    pub fn message_timeout(&self) -> Result<Duration> {
        let raw = self.required(MESSAGE_TIMEOUT_MS)?;
        match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(Error::Config(format!(
                "{} must be a positive integer, got '{}'",
                MESSAGE_TIMEOUT_MS, raw
            ))),
        }
    }

    /// Checks the invariants that must hold before a connection is opened.
    pub fn validate(&self) -> Result<()> {
        for key in REQUIRED_KEYS {
            self.required(key)?;
        }

        let brokers = self.broker_addresses();
        if brokers.is_empty() {
            return Err(Error::Config(format!("{} lists no brokers", BROKER_ADDRESSES)));
        }
        for broker in brokers {
            validate_broker_address(broker)?;
        }

        let codec = self.required(COMPRESSION_CODEC)?;
        if !COMPRESSION_CODECS.contains(&codec) {
            return Err(Error::Config(format!(
                "unsupported {} '{}', expected one of {}",
                COMPRESSION_CODEC,
                codec,
                COMPRESSION_CODECS.join(", ")
            )));
        }

        self.message_timeout()?;
        Ok(())
    }

    /// Validates and translates into the broker client's configuration.
    pub fn to_client_config(&self) -> Result<ClientConfig> {
        self.validate()?;

        let mut client_config = ClientConfig::new();
        for (key, value) in self.iter() {
            if key == BROKER_ADDRESSES {
                client_config.set("bootstrap.servers", self.broker_addresses().join(","));
            } else {
                client_config.set(key, value);
            }
        }
        Ok(client_config)
    }

    fn required(&self, key: &str) -> Result<&str> {
        match self.get(key).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            Some(_) => Err(Error::Config(format!("{} must not be empty", key))),
            None => Err(Error::Config(format!("missing required option {}", key))),
        }
    }
}

fn validate_broker_address(broker: &str) -> Result<()> {
    let invalid = || {
        Error::Config(format!(
            "invalid broker address '{}', expected host:port",
            broker
        ))
    };

    let (host, port) = broker.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(())
}

fn default_broker_addresses() -> String {
    "localhost:9092".to_string()
}

fn default_client_id() -> String {
    "default-producer".to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_message_timeout_ms() -> String {
    "5000".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProducerConfig::new();

        assert_eq!(config.get(BROKER_ADDRESSES), Some("localhost:9092"));
        assert_eq!(config.get(CLIENT_ID), Some("default-producer"));
        assert_eq!(config.get(COMPRESSION_CODEC), Some("snappy"));
        assert_eq!(config.get(MESSAGE_TIMEOUT_MS), Some("5000"));
        assert_eq!(config.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_override_wins_and_keeps_other_defaults() {
        let config = ProducerConfig::with_overrides([(CLIENT_ID, "custom-id")]);

        assert_eq!(config.client_id(), Some("custom-id"));
        assert_eq!(config.get(BROKER_ADDRESSES), Some("localhost:9092"));
        assert_eq!(config.get(COMPRESSION_CODEC), Some("snappy"));
        assert_eq!(config.get(MESSAGE_TIMEOUT_MS), Some("5000"));
    }

    #[test]
    fn test_every_required_key_survives_merge() {
        let overrides = [
            vec![],
            vec![("linger.ms", "10")],
            vec![(COMPRESSION_CODEC, "lz4"), (MESSAGE_TIMEOUT_MS, "100")],
            vec![(BROKER_ADDRESSES, "a:1,b:2"), ("acks", "all")],
        ];

        for set in overrides {
            let config = ProducerConfig::with_overrides(set.clone());
            for key in REQUIRED_KEYS {
                assert!(config.get(key).is_some(), "missing {} after {:?}", key, set);
            }
            for (key, value) in set {
                assert_eq!(config.get(key), Some(value));
            }
        }
    }

    #[test]
    fn test_last_write_wins() {
        let config = ProducerConfig::with_overrides([(CLIENT_ID, "first"), (CLIENT_ID, "second")]);
        assert_eq!(config.client_id(), Some("second"));
    }

    #[test]
    fn test_broker_aliases_are_normalized() {
        let config = ProducerConfig::with_overrides([("metadata.broker.list", "kafka:9093")]);
        assert_eq!(config.get(BROKER_ADDRESSES), Some("kafka:9093"));
        assert_eq!(config.get("metadata.broker.list"), None);

        let config = ProducerConfig::with_overrides([("bootstrap.servers", "kafka:9094")]);
        assert_eq!(config.broker_addresses(), vec!["kafka:9094"]);
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            (BROKER_ADDRESSES, ""),
            (BROKER_ADDRESSES, "localhost"),
            (BROKER_ADDRESSES, "localhost:port"),
            (BROKER_ADDRESSES, " , "),
            (CLIENT_ID, "  "),
            (COMPRESSION_CODEC, "brotli"),
            (MESSAGE_TIMEOUT_MS, "0"),
            (MESSAGE_TIMEOUT_MS, "soon"),
        ];

        for (key, value) in cases {
            let config = ProducerConfig::with_overrides([(key, value)]);
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "{}={:?} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_broker_list_is_trimmed() {
        let config = ProducerConfig::with_overrides([(BROKER_ADDRESSES, "a:9092, b:9092 ,")]);
        assert_eq!(config.broker_addresses(), vec!["a:9092", "b:9092"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_message_timeout() {
        let config = ProducerConfig::with_overrides([(MESSAGE_TIMEOUT_MS, "250")]);
        assert_eq!(config.message_timeout().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_client_config_translation() {
        let config = ProducerConfig::with_overrides([
            (BROKER_ADDRESSES, "a:9092, b:9092"),
            ("queue.buffering.max.messages", "10"),
        ]);
        let client_config = config.to_client_config().unwrap();

        assert_eq!(client_config.get("bootstrap.servers"), Some("a:9092,b:9092"));
        assert_eq!(client_config.get(BROKER_ADDRESSES), None);
        assert_eq!(client_config.get(CLIENT_ID), Some("default-producer"));
        assert_eq!(client_config.get("queue.buffering.max.messages"), Some("10"));
    }

    #[test]
    fn test_invalid_config_is_not_translated() {
        let config = ProducerConfig::with_overrides([(MESSAGE_TIMEOUT_MS, "-5")]);
        assert!(matches!(config.to_client_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_toml_str() {
        let config = ProducerConfig::from_toml_str(
            r#"
            [producer]
            "broker.addresses" = "kafka:9092"
            "client.id" = "orders-service"
            "message.timeout.ms" = 3000
            "enable.idempotence" = true
            "#,
        )
        .unwrap();

        assert_eq!(config.get(BROKER_ADDRESSES), Some("kafka:9092"));
        assert_eq!(config.client_id(), Some("orders-service"));
        assert_eq!(config.get(MESSAGE_TIMEOUT_MS), Some("3000"));
        assert_eq!(config.get("enable.idempotence"), Some("true"));
        assert_eq!(config.get(COMPRESSION_CODEC), Some("snappy"));
    }

    #[test]
    fn test_from_toml_rejects_tables() {
        let result = ProducerConfig::from_toml_str(
            r#"
            [producer.nested]
            value = 1
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[producer]\n\"compression.codec\" = \"gzip\"").unwrap();

        let config = ProducerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.get(COMPRESSION_CODEC), Some("gzip"));
    }

    #[test]
    fn test_missing_file() {
        let result = ProducerConfig::from_file("/nonexistent/kafka-dispatch.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
