#![allow(dead_code)]

use kafka_dispatch::config::{BROKER_ADDRESSES, COMPRESSION_CODEC, MESSAGE_TIMEOUT_MS};
use kafka_dispatch::kafka::{ChannelHandler, ProducerBuilder};
use kafka_dispatch::{DeliveryReport, KafkaProducer};
use std::env;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Nothing listens on port 1; messages sent there fail with a local timeout.
pub const UNREACHABLE_BROKER: &str = "127.0.0.1:1";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("kafka_dispatch=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Brokers for tests that need a real cluster.
pub fn test_brokers() -> String {
    env::var("TEST_KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string())
}

/// Unique per test process so reruns don't read old messages.
pub fn test_topic(name: &str) -> String {
    format!("test_{}_{}", name, std::process::id())
}

pub fn builder_for(brokers: &str) -> ProducerBuilder {
    KafkaProducer::builder()
        .set(BROKER_ADDRESSES, brokers)
        .set(COMPRESSION_CODEC, "none") // No compression for tests
}

pub fn unreachable_builder() -> ProducerBuilder {
    builder_for(UNREACHABLE_BROKER).set(MESSAGE_TIMEOUT_MS, "300")
}

pub fn channel_producer(builder: ProducerBuilder) -> (KafkaProducer, UnboundedReceiver<DeliveryReport>) {
    let (handler, receiver) = ChannelHandler::channel();
    let producer = builder.handler(handler).build().unwrap();
    (producer, receiver)
}

pub async fn next_report(receiver: &mut UnboundedReceiver<DeliveryReport>) -> DeliveryReport {
    tokio::time::timeout(Duration::from_secs(15), receiver.recv())
        .await
        .expect("no delivery report within 15s")
        .expect("delivery channel closed")
}
