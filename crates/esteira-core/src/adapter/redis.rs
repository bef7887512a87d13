use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::warn;

use crate::config::{QueueOptions, RedisQueueConfig};
use crate::ephemeral::{EphemeralPolicy, StoreCase};
use crate::error::{QueueError, Result};
use crate::message::{now_ms, Message};
use crate::queue::{Queue, ORPHAN_SCAN_LIMIT};
use crate::serialize::{JsonSerializer, MessageSerializer};

/// Redis adapter backed by three coordinated structures:
///
/// - a hash mapping message id to its serialized form,
/// - a list of pending ids (head on the left, tail on the right),
/// - a sorted set of taken ids scored by take instant (ephemeral storage).
///
/// `take` runs as a server-side script so the list pop, the sorted-set add
/// and the payload read happen atomically. Everything else is issued as
/// atomic pipelines; a partially applied requeue is recovered by the orphan
/// scan.
pub struct RedisQueue {
    conn: ConnectionManager,
    hash_name: String,
    list_name: String,
    sorted_set_name: String,
    policy: EphemeralPolicy,
    serializer: Arc<dyn MessageSerializer>,
    take_script: Script,
}

/// Server-side `take`, in one of two shapes depending on whether ephemeral
/// storage is maintained.
///
/// The take instant is passed as ARGV so the score reflects the consumer's
/// clock, atomically with the move; a server-side clock is not assumed.
fn take_script_source(ephemeral_enabled: bool) -> &'static str {
    if ephemeral_enabled {
        // KEYS[1] = list, KEYS[2] = sorted set, KEYS[3] = hash, ARGV[1] = now.
        // The hash entry stays until finalize.
        r#"local qid = redis.call('lpop', KEYS[1])
if qid then
  redis.call('zadd', KEYS[2], ARGV[1], qid)
  return redis.call('hget', KEYS[3], qid)
end
return nil"#
    } else {
        // KEYS[1] = list, KEYS[2] = hash. The pop is the commit point and
        // the hash entry goes with it.
        r#"local qid = redis.call('lpop', KEYS[1])
if qid then
  local content = redis.call('hget', KEYS[2], qid)
  redis.call('hdel', KEYS[2], qid)
  return content
end
return nil"#
    }
}

fn validate_names(config: &RedisQueueConfig) -> Result<()> {
    for (field, name) in [
        ("hash_name", &config.hash_name),
        ("list_name", &config.list_name),
        ("sorted_set_name", &config.sorted_set_name),
    ] {
        if name.is_empty() {
            return Err(QueueError::InvalidConfig(format!(
                "{field} must not be empty"
            )));
        }
    }
    Ok(())
}

impl RedisQueue {
    /// Connect to `url` with the default JSON serializer.
    pub async fn connect(
        url: &str,
        config: RedisQueueConfig,
        options: &QueueOptions,
    ) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::InvalidConfig(format!("redis url: {e}")))?;
        let conn = ConnectionManager::new(client).await?;
        Self::with_connection_manager(conn, config, options, Arc::new(JsonSerializer))
    }

    /// Build the adapter on a connection manager supplied by the caller.
    /// The caller keeps ownership of the connection's lifecycle.
    pub fn with_connection_manager(
        conn: ConnectionManager,
        config: RedisQueueConfig,
        options: &QueueOptions,
        serializer: Arc<dyn MessageSerializer>,
    ) -> Result<Self> {
        validate_names(&config)?;
        let policy = EphemeralPolicy::new(options);
        Ok(Self {
            conn,
            hash_name: config.hash_name,
            list_name: config.list_name,
            sorted_set_name: config.sorted_set_name,
            policy,
            serializer,
            take_script: Script::new(take_script_source(policy.enabled())),
        })
    }

    async fn store(&self, msg: &Message, case: StoreCase) -> Result<bool> {
        let stored = self.policy.bookkeep(msg, case, now_ms());
        let bytes = self.serializer.serialize(&stored)?;
        let id = stored.id.to_string();

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        if self.policy.resolve(case) != StoreCase::New {
            pipe.zrem(&self.sorted_set_name, &id).ignore();
        }
        // The hash write is a blind overwrite; the list push is the
        // authoritative commit. Hash garbage without a list entry is
        // invisible to consumers and repaired by the next retry.
        pipe.hset(&self.hash_name, &id, &bytes).ignore();
        pipe.rpush(&self.list_name, &id);
        let (pushed,): (i64,) = pipe.query_async(&mut conn).await?;
        Ok(pushed > 0)
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, msg: &Message) -> Result<bool> {
        self.store(msg, StoreCase::New).await
    }

    async fn requeue(&self, msg: &Message) -> Result<bool> {
        self.store(msg, StoreCase::Requeue).await
    }

    async fn requeue_silent(&self, msg: &Message) -> Result<bool> {
        self.store(msg, StoreCase::RequeueSilent).await
    }

    async fn take(&self) -> Result<Option<Message>> {
        if self.policy.cap_reached(self.ephemeral_size().await?) {
            return Ok(None);
        }

        let mut conn = self.conn.clone();
        let payload: Option<Vec<u8>> = if self.policy.enabled() {
            self.take_script
                .key(&self.list_name)
                .key(&self.sorted_set_name)
                .key(&self.hash_name)
                .arg(now_ms())
                .invoke_async(&mut conn)
                .await?
        } else {
            self.take_script
                .key(&self.list_name)
                .key(&self.hash_name)
                .invoke_async(&mut conn)
                .await?
        };

        match payload {
            Some(bytes) => Ok(Some(self.serializer.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn finalize(&self, msg: &Message) -> Result<()> {
        let id = msg.id.to_string();
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zrem(&self.sorted_set_name, &id).ignore();
        pipe.hdel(&self.hash_name, &id).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn orphans(&self, threshold: Duration) -> Result<Vec<Message>> {
        if !self.policy.enabled() {
            return Ok(Vec::new());
        }
        let cutoff = now_ms().saturating_sub(threshold.as_millis() as u64);

        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore_limit(
                &self.sorted_set_name,
                0u64,
                cutoff,
                0,
                ORPHAN_SCAN_LIMIT as isize,
            )
            .await?;

        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<Vec<u8>> = conn.hget(&self.hash_name, &id).await?;
            let Some(bytes) = payload else {
                // Sorted-set entry outlived its payload: a finalized
                // leftover, not an orphan.
                continue;
            };
            match self.serializer.deserialize(&bytes) {
                Ok(msg) => result.push(msg),
                Err(e) => warn!(%id, error = %e, "skipping undecodable ephemeral entry"),
            }
        }
        Ok(result)
    }

    async fn queue_size(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(&self.list_name).await?;
        Ok(len.max(0) as u64)
    }

    async fn ephemeral_size(&self) -> Result<u64> {
        if !self.policy.enabled() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let card: i64 = conn.zcard(&self.sorted_set_name).await?;
        Ok(card.max(0) as u64)
    }

    async fn purge(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(&[
                self.hash_name.as_str(),
                self.list_name.as_str(),
                self.sorted_set_name.as_str(),
            ])
            .await?;
        Ok(())
    }
}
