//! Transaction-tracker persistence for the Settlement Orchestrator
//! (spec §3 "Transaction tracker", §4.5).
//!
//! Three tables, one sqlite pool: `message_wait` tracks a broadcast
//! transaction hash to its terminal status; `rail_settlement_wait` and
//! `withdrawal_wait` each point a pending rail settlement or withdrawal at
//! the `message_wait` row that will resolve it. Status lookups are
//! self-cleaning: a `Confirmed` result, a `Failed` result, and an orphaned
//! wait row (its `message_wait` already gone) all delete the wait row on
//! the same call that reports them.

use chrono::Utc;
use piri_types::{RailId, WaitStatus};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "confirmed" => TxStatus::Confirmed,
            "failed" => TxStatus::Failed,
            _ => TxStatus::Pending,
        }
    }
}

/// A tracked on-chain transaction, from broadcast to terminal status.
#[derive(Debug, Clone)]
pub struct MessageWait {
    pub tx_hash: String,
    pub tx_status: TxStatus,
    pub tx_success: Option<bool>,
    pub confirmed_block: Option<i64>,
}

/// Persists and queries the pending-transaction tables behind one sqlite
/// pool. A single DB transaction covers every multi-table write, matching
/// the spec's "single per-request database transaction for the write
/// path" (§5).
#[derive(Clone)]
pub struct TransactionTracker {
    pool: SqlitePool,
}

impl TransactionTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the tracker tables if they don't already exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS message_wait (
                tx_hash TEXT PRIMARY KEY,
                tx_status TEXT NOT NULL,
                tx_success INTEGER,
                confirmed_block INTEGER
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rail_settlement_wait (
                rail_id INTEGER NOT NULL,
                tx_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS withdrawal_wait (
                owner TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts `{message_wait(pending), rail_settlement_wait}` in one
    /// transaction (spec §4.5 submit step 5).
    pub async fn track_rail_settlement(&self, rail_id: RailId, tx_hash: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO message_wait (tx_hash, tx_status) VALUES (?, 'pending')")
            .bind(tx_hash)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO rail_settlement_wait (rail_id, tx_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(rail_id as i64)
        .bind(tx_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts `{message_wait(pending), withdrawal_wait}` in one transaction.
    pub async fn track_withdrawal(&self, owner: &str, tx_hash: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO message_wait (tx_hash, tx_status) VALUES (?, 'pending')")
            .bind(tx_hash)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO withdrawal_wait (owner, tx_hash, created_at) VALUES (?, ?, ?)")
            .bind(owner)
            .bind(tx_hash)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Updates a tracked transaction's terminal status, as reported by a
    /// chain-status poller (an external collaborator; spec §1 scope note).
    pub async fn update_message_status(
        &self,
        tx_hash: &str,
        status: TxStatus,
        success: Option<bool>,
        confirmed_block: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE message_wait SET tx_status = ?, tx_success = ?, confirmed_block = ? WHERE tx_hash = ?",
        )
        .bind(status.as_str())
        .bind(success)
        .bind(confirmed_block)
        .bind(tx_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// True if a non-terminal `rail_settlement_wait` row exists for
    /// `rail_id` (used by the submit path's conflict check, spec §4.5 step
    /// 1). Deletes the row first if the tracked transaction has already
    /// reached a terminal status.
    pub async fn has_pending_rail_settlement(&self, rail_id: RailId) -> Result<bool> {
        match self.rail_settlement_status(rail_id).await? {
            WaitStatus::Pending => Ok(true),
            WaitStatus::None | WaitStatus::Confirmed => Ok(false),
        }
    }

    /// Resolves the status of the most recent `rail_settlement_wait` row
    /// for `rail_id`, self-cleaning on any terminal outcome.
    pub async fn rail_settlement_status(&self, rail_id: RailId) -> Result<WaitStatus> {
        let row = sqlx::query(
            "SELECT tx_hash FROM rail_settlement_wait WHERE rail_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(rail_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(WaitStatus::None);
        };
        let tx_hash: String = row.get("tx_hash");
        self.resolve_and_clean(&tx_hash, "rail_settlement_wait", "rail_id", rail_id as i64).await
    }

    /// Resolves the status of the most recent `withdrawal_wait` row for
    /// `owner`, self-cleaning on any terminal outcome (spec §4.5
    /// withdraw: "at most one pending withdrawal per owner").
    pub async fn withdrawal_status(&self, owner: &str) -> Result<WaitStatus> {
        let row = sqlx::query(
            "SELECT tx_hash FROM withdrawal_wait WHERE owner = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(WaitStatus::None);
        };
        let tx_hash: String = row.get("tx_hash");

        let wait_tx_hash = tx_hash.clone();
        let status = self.message_status(&wait_tx_hash).await?;
        match status {
            None => {
                sqlx::query("DELETE FROM withdrawal_wait WHERE owner = ? AND tx_hash = ?")
                    .bind(owner)
                    .bind(&tx_hash)
                    .execute(&self.pool)
                    .await?;
                Ok(WaitStatus::None)
            }
            Some(wait) => match wait.tx_status {
                TxStatus::Pending => Ok(WaitStatus::Pending),
                TxStatus::Confirmed | TxStatus::Failed => {
                    sqlx::query("DELETE FROM withdrawal_wait WHERE owner = ? AND tx_hash = ?")
                        .bind(owner)
                        .bind(&tx_hash)
                        .execute(&self.pool)
                        .await?;
                    let result = if wait.tx_status == TxStatus::Confirmed {
                        WaitStatus::Confirmed
                    } else {
                        WaitStatus::None
                    };
                    Ok(result)
                }
            },
        }
    }

    pub async fn message_status(&self, tx_hash: &str) -> Result<Option<MessageWait>> {
        let row = sqlx::query(
            "SELECT tx_hash, tx_status, tx_success, confirmed_block FROM message_wait WHERE tx_hash = ?",
        )
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| MessageWait {
            tx_hash: row.get("tx_hash"),
            tx_status: TxStatus::from_str(row.get::<String, _>("tx_status").as_str()),
            tx_success: row.get("tx_success"),
            confirmed_block: row.get("confirmed_block"),
        }))
    }

    async fn resolve_and_clean(
        &self,
        tx_hash: &str,
        wait_table: &str,
        id_column: &str,
        id_value: i64,
    ) -> Result<WaitStatus> {
        let status = self.message_status(tx_hash).await?;
        match status {
            None => {
                self.delete_wait_row(wait_table, id_column, id_value, tx_hash).await?;
                Ok(WaitStatus::None)
            }
            Some(wait) => match wait.tx_status {
                TxStatus::Pending => Ok(WaitStatus::Pending),
                TxStatus::Confirmed => {
                    self.delete_wait_row(wait_table, id_column, id_value, tx_hash).await?;
                    Ok(WaitStatus::Confirmed)
                }
                TxStatus::Failed => {
                    self.delete_wait_row(wait_table, id_column, id_value, tx_hash).await?;
                    Ok(WaitStatus::None)
                }
            },
        }
    }

    async fn delete_wait_row(
        &self,
        table: &str,
        id_column: &str,
        id_value: i64,
        tx_hash: &str,
    ) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE {id_column} = ? AND tx_hash = ?");
        sqlx::query(&sql).bind(id_value).bind(tx_hash).execute(&self.pool).await?;
        Ok(())
    }
}
