use crate::config::ProducerConfig;
use crate::{Error, Result};
use rdkafka::error::KafkaResult;
use rdkafka::producer::{Producer, ProducerContext, ThreadedProducer};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_FLUSH_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(5000);

/// An outbound queue that can be waited on.
pub trait Drain {
    /// Blocks until the queue is empty or `timeout` elapses.
    fn drain(&self, timeout: Duration) -> KafkaResult<()>;

    /// Queued messages, requests and events not yet served.
    fn pending(&self) -> i32;
}

impl<C> Drain for ThreadedProducer<C>
where
    C: ProducerContext + 'static,
{
    fn drain(&self, timeout: Duration) -> KafkaResult<()> {
        self.flush(timeout)
    }

    fn pending(&self) -> i32 {
        self.in_flight_count()
    }
}

/// How long `produce` may wait for the send queue to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub attempts: u32,
    pub attempt_timeout: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_ATTEMPTS, DEFAULT_ATTEMPT_TIMEOUT)
    }
}

impl FlushPolicy {
    /// At least one attempt is always made.
    pub fn new(attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            attempt_timeout,
        }
    }

    /// Three attempts, each bounded by `message.timeout.ms`.
    pub fn from_config(config: &ProducerConfig) -> Result<Self> {
        Ok(Self::new(DEFAULT_FLUSH_ATTEMPTS, config.message_timeout()?))
    }

    pub fn with_attempts(self, attempts: u32) -> Self {
        Self::new(attempts, self.attempt_timeout)
    }

    /// Upper bound on the time a flush can block.
    pub fn worst_case(&self) -> Duration {
        self.attempt_timeout * self.attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The queue emptied on attempt number `attempts`.
    Drained { attempts: u32 },
    /// Every attempt timed out with messages still outstanding.
    Exhausted {
        attempts: u32,
        attempt_timeout: Duration,
        /// Outbound queue length when giving up; see [`Drain::pending`].
        pending: i32,
    },
}

impl FlushOutcome {
    pub fn is_drained(&self) -> bool {
        matches!(self, FlushOutcome::Drained { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FlushOutcome::Drained { attempts } | FlushOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Turns an exhausted flush into [`Error::DeliveryTimeout`].
    pub fn ensure_drained(self) -> Result<()> {
        match self {
            FlushOutcome::Drained { .. } => Ok(()),
            FlushOutcome::Exhausted {
                attempts,
                attempt_timeout,
                ..
            } => Err(Error::DeliveryTimeout {
                attempts,
                timeout_ms: attempt_timeout.as_millis() as u64,
            }),
        }
    }
}

/// Waits for `queue` to drain, retrying up to `policy.attempts` times.
///
/// Stops at the first attempt that drains. Running out of attempts is not an
/// error here: the messages are still owned by the broker client and their
/// fate arrives through the delivery reports.
pub fn flush_with_retry<D>(queue: &D, policy: &FlushPolicy) -> FlushOutcome
where
    D: Drain + ?Sized,
{
    let timeout_ms = policy.attempt_timeout.as_millis() as u64;

    for attempt in 1..=policy.attempts {
        match queue.drain(policy.attempt_timeout) {
            Ok(()) => {
                debug!(attempt, "Send queue drained");
                return FlushOutcome::Drained { attempts: attempt };
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts = policy.attempts,
                    timeout_ms,
                    pending = queue.pending(),
                    error = %e,
                    "Flush attempt did not drain the send queue"
                );
            }
        }
    }

    let pending = queue.pending();
    warn!(
        attempts = policy.attempts,
        timeout_ms,
        pending,
        "Delivery timeout: send queue not drained, outcome left to delivery reports"
    );

    FlushOutcome::Exhausted {
        attempts: policy.attempts,
        attempt_timeout: policy.attempt_timeout,
        pending,
    }
}
