pub mod adapter;
pub mod config;
pub mod ephemeral;
pub mod error;
pub mod message;
pub mod queue;
pub mod serialize;
pub mod telemetry;

pub use adapter::{MemoryQueue, PgQueue, PgSingleTableQueue, RedisQueue, RingQueue};
pub use config::{PgQueueConfig, QueueOptions, RedisQueueConfig};
pub use ephemeral::EphemeralPolicy;
pub use error::{QueueError, Result};
pub use message::Message;
pub use queue::{Queue, ORPHAN_SCAN_LIMIT};
pub use serialize::{JsonSerializer, MessageSerializer};
