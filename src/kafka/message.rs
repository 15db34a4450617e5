use crate::kafka::key::resolve_key;
use crate::{Error, Result};

/// A message ready to be handed to the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Partition key. Generated when the caller did not supply one.
    pub key: String,
}

impl OutboundMessage {
    /// Builds a message, generating a key when `key` is `None`.
    ///
    /// The payload may be empty; the topic may not.
    pub fn new(topic: &str, payload: impl AsRef<[u8]>, key: Option<&str>) -> Result<Self> {
        if topic.trim().is_empty() {
            return Err(Error::InvalidMessage {
                message: "topic must not be empty".to_string(),
            });
        }

        Ok(Self {
            topic: topic.to_string(),
            payload: payload.as_ref().to_vec(),
            key: resolve_key(key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_caller_key() {
        let message = OutboundMessage::new("orders", "payload-A", Some("key-1")).unwrap();

        assert_eq!(message.topic, "orders");
        assert_eq!(message.payload, b"payload-A");
        assert_eq!(message.key, "key-1");
    }

    #[test]
    fn test_generates_distinct_keys() {
        let first = OutboundMessage::new("orders", "payload-B", None).unwrap();
        let second = OutboundMessage::new("orders", "payload-B", None).unwrap();

        assert!(uuid::Uuid::parse_str(&first.key).is_ok());
        assert_ne!(first.key, second.key);
    }

    #[test]
    fn test_empty_payload_is_allowed() {
        let message = OutboundMessage::new("orders", "", None).unwrap();
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_empty_topic_is_rejected() {
        assert!(matches!(
            OutboundMessage::new("", "payload", None),
            Err(Error::InvalidMessage { .. })
        ));
        assert!(matches!(
            OutboundMessage::new("   ", "payload", None),
            Err(Error::InvalidMessage { .. })
        ));
    }
}
