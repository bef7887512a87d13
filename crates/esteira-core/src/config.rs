use serde::Deserialize;

/// Behavior options shared by every reliability-offering adapter,
/// deserializable from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueOptions {
    /// When true, no ephemeral storage is maintained: `take` removes the
    /// message outright and `finalize` becomes a formality.
    pub ephemeral_disabled: bool,
    /// Soft cap on in-flight (taken, unfinalized) messages. `take` reports
    /// an empty queue once the cap is reached. `None` means unbounded.
    pub ephemeral_max_size: Option<u64>,
    /// Ordering discipline for `take` on the relational adapters.
    /// `true` delivers oldest-first, `false` newest-first.
    pub fifo: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            ephemeral_disabled: false,
            ephemeral_max_size: None,
            fifo: true,
        }
    }
}

/// Table names used by the relational adapters.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PgQueueConfig {
    pub table_name: String,
    pub table_name_ephemeral: String,
}

impl Default for PgQueueConfig {
    fn default() -> Self {
        Self {
            table_name: "queue".to_string(),
            table_name_ephemeral: "queue_ephemeral".to_string(),
        }
    }
}

/// Names of the three Redis structures backing one logical queue.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RedisQueueConfig {
    /// Hash mapping message id to serialized message.
    pub hash_name: String,
    /// List holding the pending ids, head on the left.
    pub list_name: String,
    /// Sorted set of taken ids, scored by take instant.
    pub sorted_set_name: String,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            hash_name: "queue_h".to_string(),
            list_name: "queue_l".to_string(),
            sorted_set_name: "queue_s".to_string(),
        }
    }
}
