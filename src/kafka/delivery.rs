//! Delivery reporting.
//!
//! Every message accepted by the send queue moves through
//! `ENQUEUED -> IN_FLIGHT -> DELIVERED | FAILED`. The first transition happens
//! inside `produce`; the terminal ones happen later on the broker client's
//! polling thread, which calls [`DeliveryContext::delivery`] exactly once per
//! message. The context turns the raw result into a [`DeliveryReport`] and
//! hands it to each registered [`DeliveryHandler`].
//!
//! Handlers are sinks: they log, count or forward reports and must not feed
//! back into producing. A handler that panics is logged and skipped so the
//! remaining handlers still see the report.

use chrono::{DateTime, Utc};
use rdkafka::client::ClientContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{DeliveryResult, ProducerContext};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::Error;

/// Terminal state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Outcome of one enqueued message as reported by the broker layer.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub status: DeliveryStatus,
    pub topic: String,
    /// Partition the message was assigned to, if it got that far.
    pub partition: Option<i32>,
    /// Offset written by the broker; only set for delivered messages.
    pub offset: Option<i64>,
    pub key: Option<String>,
    /// Echo of the original payload, for correlation.
    #[serde(serialize_with = "serialize_payload")]
    pub payload: Vec<u8>,
    #[serde(serialize_with = "serialize_error_code")]
    pub error_code: Option<RDKafkaErrorCode>,
    pub error_text: Option<String>,
    pub reported_at: DateTime<Utc>,
}

impl DeliveryReport {
    pub fn from_result(result: &DeliveryResult<'_>) -> Self {
        match result {
            Ok(message) => Self::from_message(message, None),
            Err((err, message)) => Self::from_message(message, Some(err)),
        }
    }

    fn from_message(message: &BorrowedMessage<'_>, error: Option<&KafkaError>) -> Self {
        let status = match error {
            None => DeliveryStatus::Delivered,
            Some(_) => DeliveryStatus::Failed,
        };

        Self {
            status,
            topic: message.topic().to_string(),
            partition: Some(message.partition()).filter(|p| *p >= 0),
            offset: Some(message.offset()).filter(|o| *o >= 0 && error.is_none()),
            key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            error_code: error.and_then(KafkaError::rdkafka_error_code),
            error_text: error.map(ToString::to_string),
            reported_at: Utc::now(),
        }
    }

    pub fn delivered(topic: &str, key: Option<&str>, payload: impl AsRef<[u8]>) -> Self {
        Self {
            status: DeliveryStatus::Delivered,
            topic: topic.to_string(),
            partition: None,
            offset: None,
            key: key.map(str::to_string),
            payload: payload.as_ref().to_vec(),
            error_code: None,
            error_text: None,
            reported_at: Utc::now(),
        }
    }

    pub fn failed(
        topic: &str,
        key: Option<&str>,
        payload: impl AsRef<[u8]>,
        error_code: Option<RDKafkaErrorCode>,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            error_code,
            error_text: Some(error_text.into()),
            ..Self::delivered(topic, key, payload)
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }

    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Turns a failed report into [`Error::DeliveryFailed`].
    pub fn into_result(self) -> crate::Result<Self> {
        match self.status {
            DeliveryStatus::Delivered => Ok(self),
            DeliveryStatus::Failed => Err(Error::DeliveryFailed {
                code: self.error_code,
                message: self
                    .error_text
                    .unwrap_or_else(|| "unknown delivery error".to_string()),
            }),
        }
    }
}

fn serialize_payload<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(payload))
}

fn serialize_error_code<S: Serializer>(
    code: &Option<RDKafkaErrorCode>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match code {
        Some(code) => serializer.serialize_some(&format!("{:?}", code)),
        None => serializer.serialize_none(),
    }
}

/// Receives delivery reports on the broker client's thread.
///
/// Implementations may be called concurrently and must not block for long:
/// the same thread serves every other delivery callback of the producer.
pub trait DeliveryHandler: Send + Sync + 'static {
    fn on_delivery(&self, report: &DeliveryReport);
}

impl<F> DeliveryHandler for F
where
    F: Fn(&DeliveryReport) + Send + Sync + 'static,
{
    fn on_delivery(&self, report: &DeliveryReport) {
        self(report)
    }
}

/// Logs every report. Always installed on a producer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl DeliveryHandler for LoggingHandler {
    fn on_delivery(&self, report: &DeliveryReport) {
        match report.status {
            DeliveryStatus::Delivered => info!(
                method = "on_delivery",
                topic = %report.topic,
                partition = ?report.partition,
                offset = ?report.offset,
                key = ?report.key,
                payload = %report.payload_str(),
                "Message sent successfully"
            ),
            DeliveryStatus::Failed => error!(
                method = "on_delivery",
                line = line!(),
                topic = %report.topic,
                key = ?report.key,
                payload = %report.payload_str(),
                error_code = ?report.error_code,
                error_text = report.error_text.as_deref().unwrap_or_default(),
                "Message failed to send"
            ),
        }
    }
}

/// Forwards reports onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<DeliveryReport>,
}

impl ChannelHandler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeliveryReport>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DeliveryHandler for ChannelHandler {
    fn on_delivery(&self, report: &DeliveryReport) {
        if self.sender.send(report.clone()).is_err() {
            debug!(topic = %report.topic, "Delivery report receiver dropped, report discarded");
        }
    }
}

/// Producer context registered with the broker client at open time.
pub struct DeliveryContext {
    handlers: Vec<Arc<dyn DeliveryHandler>>,
}

impl DeliveryContext {
    pub fn new(handlers: Vec<Arc<dyn DeliveryHandler>>) -> Self {
        Self { handlers }
    }

    /// Runs every handler, isolating panics.
    pub fn dispatch(&self, report: &DeliveryReport) {
        for handler in &self.handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.on_delivery(report)));
            if outcome.is_err() {
                error!(
                    method = "dispatch",
                    line = line!(),
                    topic = %report.topic,
                    "Delivery handler panicked"
                );
            }
        }
    }
}

impl ClientContext for DeliveryContext {
    fn error(&self, error: KafkaError, reason: &str) {
        warn!(error = %error, reason, "Kafka client error");
    }
}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        let report = DeliveryReport::from_result(delivery_result);
        self.dispatch(&report);
    }
}
