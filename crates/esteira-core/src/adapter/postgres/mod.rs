//! Relational adapters on PostgreSQL.
//!
//! Two variants with identical contract behavior:
//!
//! - [`PgQueue`] - two tables of identical shape, one for queue storage and
//!   one for ephemeral storage; `take` moves a row between them inside a
//!   transaction.
//! - [`PgSingleTableQueue`] - one table with a nullable claim token column;
//!   `take` stamps the token instead of moving the row.
//!
//! Row selection under concurrent consumers relies on
//! `FOR UPDATE SKIP LOCKED`, so two consumers never see the same row.

mod single_table;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::{PgQueueConfig, QueueOptions};
use crate::ephemeral::{EphemeralPolicy, StoreCase};
use crate::error::{QueueError, Result};
use crate::message::{now_ms, Message};
use crate::queue::{Queue, ORPHAN_SCAN_LIMIT};

pub use single_table::PgSingleTableQueue;

const MESSAGE_COLUMNS: &str =
    "queue_id, msg_org_timestamp, msg_timestamp, msg_num_requeues, msg_content";

/// Table names are spliced into SQL text, so they are restricted to plain
/// identifiers and checked once at construction.
pub(super) fn validate_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(QueueError::InvalidConfig(format!(
            "invalid table name: {name:?}"
        )))
    }
}

pub(super) fn row_to_message(row: &PgRow) -> Result<Message> {
    let id: Uuid = row.try_get("queue_id")?;
    let origin: i64 = row.try_get("msg_org_timestamp")?;
    let timestamp: i64 = row.try_get("msg_timestamp")?;
    let num_requeues: i32 = row.try_get("msg_num_requeues")?;
    let content: Vec<u8> = row.try_get("msg_content")?;
    Ok(Message {
        id,
        content,
        origin_timestamp: origin as u64,
        timestamp: timestamp as u64,
        num_requeues: num_requeues as u32,
    })
}

async fn ensure_schema(pool: &PgPool, table: &str) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            queue_id UUID PRIMARY KEY,
            msg_org_timestamp BIGINT NOT NULL,
            msg_timestamp BIGINT NOT NULL,
            msg_num_requeues INT NOT NULL DEFAULT 0,
            msg_content BYTEA NOT NULL
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_msg_timestamp ON {table} (msg_timestamp)"
    ))
    .execute(pool)
    .await?;
    Ok(())
}

/// SQL text assembled once at construction.
struct Statements {
    insert_queue: String,
    insert_ephemeral: String,
    select_take: String,
    delete_queue: String,
    delete_ephemeral: String,
    select_orphans: String,
    count_queue: String,
    count_ephemeral: String,
    purge_queue: String,
    purge_ephemeral: String,
}

impl Statements {
    fn new(config: &PgQueueConfig, fifo: bool) -> Self {
        let queue = &config.table_name;
        let ephemeral = &config.table_name_ephemeral;
        let order = if fifo { "ASC" } else { "DESC" };
        Self {
            insert_queue: insert_sql(queue),
            insert_ephemeral: insert_sql(ephemeral),
            select_take: format!(
                "SELECT {MESSAGE_COLUMNS} FROM {queue} \
                 ORDER BY msg_timestamp {order}, queue_id {order} \
                 LIMIT 1 FOR UPDATE SKIP LOCKED"
            ),
            delete_queue: format!("DELETE FROM {queue} WHERE queue_id = $1"),
            delete_ephemeral: format!("DELETE FROM {ephemeral} WHERE queue_id = $1"),
            select_orphans: format!(
                "SELECT {MESSAGE_COLUMNS} FROM {ephemeral} WHERE msg_timestamp < $1 \
                 ORDER BY msg_timestamp ASC LIMIT {ORPHAN_SCAN_LIMIT}"
            ),
            count_queue: format!("SELECT COUNT(*) FROM {queue}"),
            count_ephemeral: format!("SELECT COUNT(*) FROM {ephemeral}"),
            purge_queue: format!("DELETE FROM {queue}"),
            purge_ephemeral: format!("DELETE FROM {ephemeral}"),
        }
    }
}

fn insert_sql(table: &str) -> String {
    // An id already present means the same message instance was committed by
    // an earlier attempt; the conflict clause keeps the retry idempotent.
    format!(
        "INSERT INTO {table} ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (queue_id) DO NOTHING"
    )
}

/// Two-table relational adapter.
///
/// Queue and ephemeral tables share one shape; `take` selects the oldest
/// (or newest, under LIFO) queue row with a skip-locked row lock, copies it
/// into the ephemeral table stamped with the take instant, and deletes it
/// from the queue table - one transaction, all or nothing.
pub struct PgQueue {
    pool: PgPool,
    owns_pool: bool,
    policy: EphemeralPolicy,
    sql: Statements,
}

impl PgQueue {
    /// Connect to `url` with an adapter-owned pool.
    #[tracing::instrument(skip_all)]
    pub async fn connect(
        url: &str,
        config: PgQueueConfig,
        options: &QueueOptions,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        Self::init(pool, true, config, options).await
    }

    /// Build the adapter on a pool supplied by the caller. The shared pool
    /// is never closed by [`close`](PgQueue::close).
    pub async fn with_pool(
        pool: PgPool,
        config: PgQueueConfig,
        options: &QueueOptions,
    ) -> Result<Self> {
        Self::init(pool, false, config, options).await
    }

    async fn init(
        pool: PgPool,
        owns_pool: bool,
        config: PgQueueConfig,
        options: &QueueOptions,
    ) -> Result<Self> {
        validate_table_name(&config.table_name)?;
        validate_table_name(&config.table_name_ephemeral)?;
        ensure_schema(&pool, &config.table_name).await?;
        ensure_schema(&pool, &config.table_name_ephemeral).await?;
        Ok(Self {
            pool,
            owns_pool,
            policy: EphemeralPolicy::new(options),
            sql: Statements::new(&config, options.fifo),
        })
    }

    /// Close the pool if this adapter created it. Idempotent; a pool
    /// injected through [`with_pool`](PgQueue::with_pool) is left alone.
    pub async fn close(&self) {
        if self.owns_pool {
            self.pool.close().await;
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn store(&self, msg: &Message, case: StoreCase) -> Result<bool> {
        let stored = self.policy.bookkeep(msg, case, now_ms());
        match self.policy.resolve(case) {
            StoreCase::New => {
                bind_message(sqlx::query(&self.sql.insert_queue), &stored)
                    .execute(&self.pool)
                    .await?;
            }
            StoreCase::Requeue | StoreCase::RequeueSilent => {
                let mut tx = self.pool.begin().await?;
                sqlx::query(&self.sql.delete_ephemeral)
                    .bind(stored.id)
                    .execute(&mut *tx)
                    .await?;
                bind_message(sqlx::query(&self.sql.insert_queue), &stored)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
        }
        Ok(true)
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_message<'q>(query: PgQuery<'q>, msg: &'q Message) -> PgQuery<'q> {
    query
        .bind(msg.id)
        .bind(msg.origin_timestamp as i64)
        .bind(msg.timestamp as i64)
        .bind(msg.num_requeues as i32)
        .bind(msg.content.as_slice())
}

#[async_trait]
impl Queue for PgQueue {
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
        let now = now_ms();

        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query(&self.sql.select_take)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let msg = row_to_message(&row)?;

        if self.policy.enabled() {
            // The ephemeral copy carries the take instant; origin timestamp
            // and requeue count ride along unchanged.
            sqlx::query(&self.sql.insert_ephemeral)
                .bind(msg.id)
                .bind(msg.origin_timestamp as i64)
                .bind(now as i64)
                .bind(msg.num_requeues as i32)
                .bind(msg.content.as_slice())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&self.sql.delete_queue)
            .bind(msg.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(msg))
    }

    async fn finalize(&self, msg: &Message) -> Result<()> {
        sqlx::query(&self.sql.delete_ephemeral)
            .bind(msg.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn orphans(&self, threshold: Duration) -> Result<Vec<Message>> {
        if !self.policy.enabled() {
            return Ok(Vec::new());
        }
        let cutoff = now_ms().saturating_sub(threshold.as_millis() as u64);
        let rows = sqlx::query(&self.sql.select_orphans)
            .bind(cutoff as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn queue_size(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&self.sql.count_queue)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn ephemeral_size(&self) -> Result<u64> {
        if !self.policy.enabled() {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar(&self.sql.count_ephemeral)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn purge(&self) -> Result<()> {
        sqlx::query(&self.sql.purge_queue)
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.sql.purge_ephemeral)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
