use crate::config::ProducerConfig;
use crate::kafka::delivery::{DeliveryContext, DeliveryHandler, LoggingHandler};
use crate::kafka::flush::{flush_with_retry, FlushOutcome, FlushPolicy, DEFAULT_FLUSH_ATTEMPTS};
use crate::kafka::message::OutboundMessage;
use crate::kafka::registry::ProducerRegistry;
use crate::{Error, Result};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{BaseRecord, Producer, ThreadedProducer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Process-wide instance behind [`KafkaProducer::shared`].
static SHARED: ProducerRegistry<KafkaProducer> = ProducerRegistry::new();

/// Kafka producer with bounded flush retries.
///
/// `produce` enqueues a message and then waits, a bounded number of times, for
/// the send queue to drain. Whether a given message actually reached the
/// broker is only known from the delivery reports, which may arrive after
/// `produce` returned.
///
/// The producer is `Send + Sync`; share it through an `Arc`.
pub struct KafkaProducer {
    producer: ThreadedProducer<DeliveryContext>,
    config: ProducerConfig,
    flush_policy: FlushPolicy,
}

impl KafkaProducer {
    pub fn builder() -> ProducerBuilder {
        ProducerBuilder::new()
    }

    /// Opens an independent connection with `overrides` merged onto the defaults.
    pub fn new<I, K, V>(overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::builder().overrides(overrides).build()
    }

    /// Returns the process-wide producer, creating it on the first call.
    ///
    /// Overrides passed after the instance exists are ignored.
    pub fn shared<I, K, V>(overrides: I) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::builder().overrides(overrides).build_shared()
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.flush_policy
    }

    /// Enqueues `message` for `topic` and waits for the send queue to drain.
    ///
    /// A missing `key` is replaced by a random UUID. Returns
    /// [`Error::EnqueueRejected`] when the local queue is full; a flush that
    /// never drains is logged and otherwise ignored.
    #[instrument(skip(self, message))]
    pub fn produce(&self, topic: &str, message: impl AsRef<[u8]>, key: Option<&str>) -> Result<()> {
        let message = OutboundMessage::new(topic, message, key)?;
        self.enqueue(&message)?;
        self.flush();
        Ok(())
    }

    /// Hands `message` to the broker client's send queue without waiting.
    pub fn enqueue(&self, message: &OutboundMessage) -> Result<()> {
        let record: BaseRecord<'_, str, [u8]> = BaseRecord::to(&message.topic)
            .payload(message.payload.as_slice())
            .key(message.key.as_str());

        self.producer
            .send(record)
            .map_err(|(err, _)| enqueue_error(&message.topic, err))?;

        debug!(
            topic = %message.topic,
            key = %message.key,
            bytes = message.payload.len(),
            "Message enqueued"
        );
        Ok(())
    }

    /// Waits for the send queue to drain according to the flush policy.
    pub fn flush(&self) -> FlushOutcome {
        flush_with_retry(&self.producer, &self.flush_policy)
    }

    /// Length of the broker client's outbound queue: messages, protocol
    /// requests and client events not yet served (librdkafka `outq_len`).
    ///
    /// Not a message count. Internal events such as connection errors are
    /// included, so the value may be non-zero with nothing produced.
    pub fn in_flight_count(&self) -> i32 {
        self.producer.in_flight_count()
    }
}

impl fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("config", &self.config)
            .field("flush_policy", &self.flush_policy)
            .finish_non_exhaustive()
    }
}

fn enqueue_error(topic: &str, err: KafkaError) -> Error {
    if matches!(err.rdkafka_error_code(), Some(RDKafkaErrorCode::QueueFull)) {
        warn!(topic, "Send queue full, message rejected");
        Error::EnqueueRejected {
            topic: topic.to_string(),
            source: err,
        }
    } else {
        Error::Kafka(err)
    }
}

/// Configures and opens a [`KafkaProducer`].
pub struct ProducerBuilder {
    config: ProducerConfig,
    handlers: Vec<Arc<dyn DeliveryHandler>>,
    flush_attempts: u32,
}

impl Default for ProducerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerBuilder {
    pub fn new() -> Self {
        Self {
            config: ProducerConfig::default(),
            handlers: Vec::new(),
            flush_attempts: DEFAULT_FLUSH_ATTEMPTS,
        }
    }

    /// Replaces the base configuration (defaults unless set otherwise).
    pub fn config(mut self, config: ProducerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.config.merge(overrides);
        self
    }

    /// Adds a delivery sink next to the always-present [`LoggingHandler`].
    pub fn handler<H: DeliveryHandler>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn flush_attempts(mut self, attempts: u32) -> Self {
        self.flush_attempts = attempts;
        self
    }

    /// Opens an independent connection.
    pub fn build(self) -> Result<KafkaProducer> {
        let client_config = self.config.to_client_config()?;
        let flush_policy = FlushPolicy::from_config(&self.config)?.with_attempts(self.flush_attempts);

        let mut handlers: Vec<Arc<dyn DeliveryHandler>> = vec![Arc::new(LoggingHandler)];
        handlers.extend(self.handlers);
        let context = DeliveryContext::new(handlers);

        let producer: ThreadedProducer<DeliveryContext> =
            client_config.create_with_context(context).map_err(|e| match e {
                KafkaError::ClientConfig(..) => Error::Config(e.to_string()),
                other => Error::Kafka(other),
            })?;

        info!(
            brokers = ?self.config.broker_addresses(),
            client_id = self.config.client_id().unwrap_or_default(),
            flush_attempts = flush_policy.attempts,
            attempt_timeout_ms = flush_policy.attempt_timeout.as_millis() as u64,
            "Kafka producer created"
        );

        Ok(KafkaProducer {
            producer,
            config: self.config,
            flush_policy,
        })
    }

    /// Returns the instance held by `registry`, building it if the registry is empty.
    pub fn build_into(self, registry: &ProducerRegistry<KafkaProducer>) -> Result<Arc<KafkaProducer>> {
        let mut created = false;
        let producer = registry.get_or_try_init(|| {
            created = true;
            self.build()
        })?;

        if !created {
            debug!("Reusing existing Kafka producer, configuration overrides ignored");
        }
        Ok(producer)
    }

    /// Returns the process-wide instance, building it on first use.
    pub fn build_shared(self) -> Result<Arc<KafkaProducer>> {
        self.build_into(&SHARED)
    }
}
