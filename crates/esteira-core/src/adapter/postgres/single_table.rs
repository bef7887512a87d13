use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{row_to_message, validate_table_name};
use crate::config::QueueOptions;
use crate::ephemeral::{EphemeralPolicy, StoreCase};
use crate::error::Result;
use crate::message::{now_ms, Message};
use crate::queue::{Queue, ORPHAN_SCAN_LIMIT};

const MESSAGE_COLUMNS: &str =
    "queue_id, msg_org_timestamp, msg_timestamp, msg_num_requeues, msg_content";

/// Less-locking single-table relational adapter.
///
/// One table with a nullable `ephemeral_id` claim token: NULL means the row
/// is available, non-NULL means it is in ephemeral storage. `take` stamps a
/// fresh token on one skip-locked row instead of moving it between tables,
/// trading the transactional move for a cheaper claim. `msg_timestamp` is
/// refreshed at claim time, making it the take-age the orphan scan keys on.
pub struct PgSingleTableQueue {
    pool: PgPool,
    owns_pool: bool,
    policy: EphemeralPolicy,
    sql: Statements,
}

struct Statements {
    insert: String,
    take_claim: String,
    take_remove: String,
    requeue: String,
    delete_claimed: String,
    select_orphans: String,
    count_pending: String,
    count_claimed: String,
    purge: String,
}

impl Statements {
    fn new(table: &str, fifo: bool) -> Self {
        let order = if fifo { "ASC" } else { "DESC" };
        let selected = format!(
            "SELECT {MESSAGE_COLUMNS} FROM {table} \
             WHERE ephemeral_id IS NULL \
             ORDER BY msg_timestamp {order}, queue_id {order} \
             LIMIT 1 FOR UPDATE SKIP LOCKED"
        );
        Self {
            insert: format!(
                "INSERT INTO {table} (queue_id, ephemeral_id, msg_org_timestamp, \
                 msg_timestamp, msg_num_requeues, msg_content) \
                 VALUES ($1, NULL, $2, $3, $4, $5) \
                 ON CONFLICT (queue_id) DO NOTHING"
            ),
            take_claim: format!(
                "WITH selected AS ({selected}), \
                 claimed AS (UPDATE {table} SET ephemeral_id = $1, msg_timestamp = $2 \
                 WHERE queue_id IN (SELECT queue_id FROM selected)) \
                 SELECT {MESSAGE_COLUMNS} FROM selected"
            ),
            take_remove: format!(
                "WITH selected AS ({selected}), \
                 removed AS (DELETE FROM {table} \
                 WHERE queue_id IN (SELECT queue_id FROM selected)) \
                 SELECT {MESSAGE_COLUMNS} FROM selected"
            ),
            requeue: format!(
                "UPDATE {table} SET ephemeral_id = NULL, msg_timestamp = $2, \
                 msg_num_requeues = $3 WHERE queue_id = $1"
            ),
            delete_claimed: format!(
                "DELETE FROM {table} WHERE queue_id = $1 AND ephemeral_id IS NOT NULL"
            ),
            select_orphans: format!(
                "SELECT {MESSAGE_COLUMNS} FROM {table} \
                 WHERE ephemeral_id IS NOT NULL AND msg_timestamp < $1 \
                 ORDER BY msg_timestamp ASC LIMIT {ORPHAN_SCAN_LIMIT}"
            ),
            count_pending: format!("SELECT COUNT(*) FROM {table} WHERE ephemeral_id IS NULL"),
            count_claimed: format!(
                "SELECT COUNT(*) FROM {table} WHERE ephemeral_id IS NOT NULL"
            ),
            purge: format!("DELETE FROM {table}"),
        }
    }
}

async fn ensure_schema(pool: &PgPool, table: &str) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            queue_id UUID PRIMARY KEY,
            ephemeral_id UUID UNIQUE,
            msg_org_timestamp BIGINT NOT NULL,
            msg_timestamp BIGINT NOT NULL,
            msg_num_requeues INT NOT NULL DEFAULT 0,
            msg_content BYTEA NOT NULL
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_pending ON {table} (msg_timestamp) \
         WHERE ephemeral_id IS NULL"
    ))
    .execute(pool)
    .await?;
    Ok(())
}

impl PgSingleTableQueue {
    /// Connect to `url` with an adapter-owned pool.
    #[tracing::instrument(skip_all)]
    pub async fn connect(url: &str, table: &str, options: &QueueOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        Self::init(pool, true, table, options).await
    }

    /// Build the adapter on a pool supplied by the caller; the shared pool
    /// is never closed by [`close`](PgSingleTableQueue::close).
    pub async fn with_pool(pool: PgPool, table: &str, options: &QueueOptions) -> Result<Self> {
        Self::init(pool, false, table, options).await
    }

    async fn init(
        pool: PgPool,
        owns_pool: bool,
        table: &str,
        options: &QueueOptions,
    ) -> Result<Self> {
        validate_table_name(table)?;
        ensure_schema(&pool, table).await?;
        Ok(Self {
            pool,
            owns_pool,
            policy: EphemeralPolicy::new(options),
            sql: Statements::new(table, options.fifo),
        })
    }

    /// Close the pool if this adapter created it. Idempotent.
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
                self.insert(&stored).await?;
            }
            StoreCase::Requeue | StoreCase::RequeueSilent => {
                let updated = sqlx::query(&self.sql.requeue)
                    .bind(stored.id)
                    .bind(stored.timestamp as i64)
                    .bind(stored.num_requeues as i32)
                    .execute(&self.pool)
                    .await?;
                if updated.rows_affected() == 0 {
                    // Row already gone (finalized or purged in the
                    // meantime); re-insert like the two-table variant does.
                    self.insert(&stored).await?;
                }
            }
        }
        Ok(true)
    }

    async fn insert(&self, msg: &Message) -> Result<()> {
        sqlx::query(&self.sql.insert)
            .bind(msg.id)
            .bind(msg.origin_timestamp as i64)
            .bind(msg.timestamp as i64)
            .bind(msg.num_requeues as i32)
            .bind(msg.content.as_slice())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Queue for PgSingleTableQueue {
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

        // One data-modifying CTE: select with a skip-locked row lock, claim
        // (or delete) the row, return the pre-claim values.
        let row = if self.policy.enabled() {
            sqlx::query(&self.sql.take_claim)
                .bind(Uuid::now_v7())
                .bind(now_ms() as i64)
                .fetch_optional(&self.pool)
                .await?
        } else {
            sqlx::query(&self.sql.take_remove)
                .fetch_optional(&self.pool)
                .await?
        };

        row.as_ref().map(row_to_message).transpose()
    }

    async fn finalize(&self, msg: &Message) -> Result<()> {
        sqlx::query(&self.sql.delete_claimed)
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
        let count: i64 = sqlx::query_scalar(&self.sql.count_pending)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn ephemeral_size(&self) -> Result<u64> {
        if !self.policy.enabled() {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar(&self.sql.count_claimed)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn purge(&self) -> Result<()> {
        sqlx::query(&self.sql.purge).execute(&self.pool).await?;
        Ok(())
    }
}
