pub mod config;
pub mod error;

pub mod kafka;

pub use config::ProducerConfig;
pub use error::{Error, Result};
pub use kafka::{DeliveryReport, KafkaProducer};
