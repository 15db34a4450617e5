//! Error types and result handling for kafka-dispatch.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Failures split into two groups. Problems the client can detect on the
//! caller's thread (bad configuration, a full send queue) are returned from
//! the call that hit them. Outcomes decided by the broker arrive later through
//! the delivery callback and are never returned from `produce`.
//!
//! # Example
//!
//! ```rust
//! use kafka_dispatch::{Error, Result};
//!
//! fn open_producer() -> Result<()> {
//!     // Simulating a missing broker list
//!     Err(Error::Config("broker.addresses must not be empty".to_string()))
//! }
//!
//! match open_producer() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// The main error type for kafka-dispatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration key is missing or malformed. The connection
    /// is not opened.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file could not be parsed.
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// The local send queue refused the message, typically because it is full.
    ///
    /// Raised synchronously from `produce`/`enqueue`. No delivery report is
    /// ever emitted for a rejected message, so the caller may retry or drop it.
    #[error("Message for topic '{topic}' rejected by the local send queue: {source}")]
    EnqueueRejected {
        /// Topic the message was addressed to
        topic: String,
        /// Error reported by the broker client
        #[source]
        source: KafkaError,
    },

    /// Every flush attempt ran out of time before the send queue drained.
    #[error("Delivery timed out: queue not drained after {attempts} flush attempts of {timeout_ms} ms")]
    DeliveryTimeout {
        /// Number of flush attempts made
        attempts: u32,
        /// Per-attempt timeout in milliseconds
        timeout_ms: u64,
    },

    /// The broker layer reported a terminal failure for a message.
    #[error("Delivery failed: {message}")]
    DeliveryFailed {
        /// Error code reported by the broker client, if any
        code: Option<RDKafkaErrorCode>,
        /// Human readable error text
        message: String,
    },

    /// The message itself is unusable, e.g. an empty topic name.
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Description of what was invalid
        message: String,
    },

    /// Kafka client error not covered by a more specific variant.
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// I/O error, typically from reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenient Result type alias for kafka-dispatch operations.
///
/// This is equivalent to `std::result::Result<T, kafka_dispatch::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
