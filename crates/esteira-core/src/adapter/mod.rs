//! Queue adapters.
//!
//! - `memory` - lock-protected in-process adapter, the behavioral reference
//! - `postgres` - relational adapters (two-table, and less-locking single-table)
//! - `redis` - hash + list + sorted-set adapter with a scripted atomic take
//! - `ring` - bounded in-process ring, no ephemeral storage

pub mod memory;
pub mod postgres;
pub mod redis;
pub mod ring;

pub use memory::MemoryQueue;
pub use postgres::{PgQueue, PgSingleTableQueue};
pub use redis::RedisQueue;
pub use ring::RingQueue;
