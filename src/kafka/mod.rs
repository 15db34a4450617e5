pub mod delivery;
pub mod flush;
pub mod key;
pub mod message;
pub mod producer;
pub mod registry;

#[cfg(test)]
mod log_capture;

pub use delivery::{ChannelHandler, DeliveryContext, DeliveryHandler, DeliveryReport, DeliveryStatus, LoggingHandler};
pub use flush::{flush_with_retry, Drain, FlushOutcome, FlushPolicy};
pub use key::{generate_key, resolve_key};
pub use message::OutboundMessage;
pub use producer::{KafkaProducer, ProducerBuilder};
pub use registry::ProducerRegistry;
