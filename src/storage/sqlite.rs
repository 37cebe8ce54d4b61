//! SQLite-backed store.
//!
//! Timestamps are stored as Unix milliseconds and prices as decimal text so
//! that nothing is lost on the way through the database. The pool is limited
//! to a single connection: every accept-bid transaction runs alone, and an
//! in-memory database (`sqlite::memory:`) survives for the pool's lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{profiled, BidOutcome, BidStore, SessionStore};
use crate::auction::transition::{apply_bid, closing_status, Transition};
use crate::error::{AuctionError, StoreError};
use crate::types::{Bid, ProductLine, Session, SessionStatus};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        creator_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        start_price TEXT NOT NULL,
        current_price TEXT NOT NULL,
        step_percent TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        duration_minutes INTEGER NOT NULL,
        in_additional_purchase INTEGER NOT NULL DEFAULT 0,
        last_bid_id INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS bids (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL REFERENCES sessions(id),
        provider_id INTEGER NOT NULL,
        sequence INTEGER NOT NULL,
        placed_at INTEGER NOT NULL,
        resulting_price TEXT NOT NULL,
        automated INTEGER NOT NULL DEFAULT 0,
        UNIQUE (session_id, sequence)
    )",
    "CREATE INDEX IF NOT EXISTS idx_bids_session_provider ON bids (session_id, provider_id)",
    "CREATE TABLE IF NOT EXISTS product_journal (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL REFERENCES sessions(id),
        product_id INTEGER NOT NULL,
        quantity INTEGER NOT NULL
    )",
];

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    name: String,
    creator_id: i64,
    status: String,
    start_price: String,
    current_price: String,
    step_percent: String,
    start_time: i64,
    duration_minutes: i64,
    in_additional_purchase: bool,
    last_bid_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct BidRow {
    id: i64,
    session_id: i64,
    provider_id: i64,
    sequence: i64,
    placed_at: i64,
    resulting_price: String,
    automated: bool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    product_id: i64,
    quantity: i32,
}

fn corrupt(entity: &'static str, id: i64, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        entity,
        id,
        reason: reason.into(),
    }
}

fn parse_decimal(entity: &'static str, id: i64, text: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(text).map_err(|e| corrupt(entity, id, format!("bad decimal {text:?}: {e}")))
}

fn parse_millis(entity: &'static str, id: i64, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt(entity, id, format!("timestamp {millis} out of range")))
}

impl BidRow {
    fn into_bid(self) -> Result<Bid, StoreError> {
        Ok(Bid {
            id: self.id,
            session_id: self.session_id,
            provider_id: self.provider_id,
            sequence: self.sequence,
            placed_at: parse_millis("bid", self.id, self.placed_at)?,
            resulting_price: parse_decimal("bid", self.id, &self.resulting_price)?,
            automated: self.automated,
        })
    }
}

// ---------------------------------------------------------------------------
// Queries shared by the pool and transactions
// ---------------------------------------------------------------------------

async fn load_session(conn: &mut SqliteConnection, id: i64) -> Result<Option<Session>, StoreError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT id, name, creator_id, status, start_price, current_price, step_percent,
                start_time, duration_minutes, in_additional_purchase, last_bid_id
         FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, row).await?)),
        None => Ok(None),
    }
}

/// Attach the last bid and product lines to a session row.
async fn hydrate(conn: &mut SqliteConnection, row: SessionRow) -> Result<Session, StoreError> {
    let last_bid = match row.last_bid_id {
        Some(bid_id) => {
            let bid = sqlx::query_as::<_, BidRow>(
                "SELECT id, session_id, provider_id, sequence, placed_at, resulting_price, automated
                 FROM bids WHERE id = ?",
            )
            .bind(bid_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| corrupt("session", row.id, format!("last bid {bid_id} missing")))?;
            Some(bid.into_bid()?)
        }
        None => None,
    };

    let products = sqlx::query_as::<_, ProductRow>(
        "SELECT product_id, quantity FROM product_journal WHERE session_id = ? ORDER BY id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|p| ProductLine {
        product_id: p.product_id,
        quantity: p.quantity,
    })
    .collect();

    let status = SessionStatus::from_str(&row.status)
        .map_err(|e| corrupt("session", row.id, e.to_string()))?;

    Ok(Session {
        id: row.id,
        name: row.name,
        creator_id: row.creator_id,
        status,
        start_price: parse_decimal("session", row.id, &row.start_price)?,
        current_price: parse_decimal("session", row.id, &row.current_price)?,
        step_percent: parse_decimal("session", row.id, &row.step_percent)?,
        start_time: parse_millis("session", row.id, row.start_time)?,
        duration_minutes: row.duration_minutes,
        in_additional_purchase: row.in_additional_purchase,
        last_bid,
        products,
    })
}

/// Write back the mutable columns, refusing to touch a closed session.
async fn write_session(conn: &mut SqliteConnection, session: &Session) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE sessions
         SET status = ?, current_price = ?, duration_minutes = ?,
             in_additional_purchase = ?, last_bid_id = ?
         WHERE id = ? AND status = ?",
    )
    .bind(session.status.as_str())
    .bind(session.current_price.to_string())
    .bind(session.duration_minutes)
    .bind(session.in_additional_purchase)
    .bind(session.last_bid.as_ref().map(|b| b.id))
    .bind(session.id)
    .bind(SessionStatus::Active.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE id = ?")
        .bind(session.id)
        .fetch_one(&mut *conn)
        .await?;
    if exists > 0 {
        Err(StoreError::SessionClosed(session.id))
    } else {
        Err(corrupt("session", session.id, "no such row"))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and make sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(url, "SQLite store ready");
        Ok(Self { pool })
    }

    /// Insert a session with its product lines. The id and any last bid on
    /// `session` are ignored; the stored copy is returned.
    pub async fn insert_session(&self, session: &Session) -> Result<Session, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO sessions (
                name, creator_id, status, start_price, current_price, step_percent,
                start_time, duration_minutes, in_additional_purchase
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.name)
        .bind(session.creator_id)
        .bind(session.status.as_str())
        .bind(session.start_price.to_string())
        .bind(session.current_price.to_string())
        .bind(session.step_percent.to_string())
        .bind(session.start_time.timestamp_millis())
        .bind(session.duration_minutes)
        .bind(session.in_additional_purchase)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for line in &session.products {
            sqlx::query(
                "INSERT INTO product_journal (session_id, product_id, quantity) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let stored = load_session(&mut tx, id)
            .await?
            .ok_or_else(|| corrupt("session", id, "vanished after insert"))?;
        tx.commit().await?;
        Ok(stored)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        profiled("get_session", async {
            let mut conn = self.pool.acquire().await?;
            load_session(&mut conn, id).await
        })
        .await
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        profiled("update_session", async {
            let mut conn = self.pool.acquire().await?;
            write_session(&mut conn, session).await
        })
        .await
    }

    async fn close_expired(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionStatus>, StoreError> {
        profiled("close_expired", async {
            let mut tx = self.pool.begin().await?;
            let session = load_session(&mut tx, id)
                .await?
                .ok_or_else(|| corrupt("session", id, "no such row"))?;

            let Some(status) = closing_status(&session, now) else {
                return Ok(None);
            };
            sqlx::query("UPDATE sessions SET status = ? WHERE id = ? AND status = ?")
                .bind(status.as_str())
                .bind(id)
                .bind(SessionStatus::Active.as_str())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(Some(status))
        })
        .await
    }

    async fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<Session>, StoreError> {
        profiled("list_sessions_by_status", async {
            let mut conn = self.pool.acquire().await?;
            let rows = sqlx::query_as::<_, SessionRow>(
                "SELECT id, name, creator_id, status, start_price, current_price, step_percent,
                        start_time, duration_minutes, in_additional_purchase, last_bid_id
                 FROM sessions WHERE status = ? ORDER BY id",
            )
            .bind(status.as_str())
            .fetch_all(&mut *conn)
            .await?;

            let mut sessions = Vec::with_capacity(rows.len());
            for row in rows {
                sessions.push(hydrate(&mut conn, row).await?);
            }
            Ok(sessions)
        })
        .await
    }
}

#[async_trait]
impl BidStore for SqliteStore {
    async fn insert_bid(
        &self,
        session_id: i64,
        provider_id: i64,
        at: DateTime<Utc>,
    ) -> Result<BidOutcome, AuctionError> {
        profiled("insert_bid", async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

            let mut session = load_session(&mut tx, session_id)
                .await?
                .ok_or(AuctionError::SessionNotFound(session_id))?;

            // Dropping `tx` on any early return rolls everything back
            let outcome = match apply_bid(&mut session, provider_id, at)? {
                Transition::Accepted(pending) => {
                    let result = sqlx::query(
                        "INSERT INTO bids (
                            session_id, provider_id, sequence, placed_at, resulting_price, automated
                        ) VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(session_id)
                    .bind(pending.provider_id)
                    .bind(pending.sequence)
                    .bind(pending.placed_at.timestamp_millis())
                    .bind(pending.resulting_price.to_string())
                    .bind(true)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::from)?;

                    let bid = pending.into_bid(result.last_insert_rowid(), session_id);
                    session.last_bid = Some(bid.clone());
                    BidOutcome::Placed(bid)
                }
                Transition::Expired => BidOutcome::Expired,
            };

            write_session(&mut tx, &session).await?;
            tx.commit().await.map_err(StoreError::from)?;
            Ok(outcome)
        })
        .await
    }

    async fn count_bids(&self, session_id: i64, user_id: i64) -> Result<i64, StoreError> {
        profiled("count_bids", async {
            let count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM bids WHERE session_id = ? AND provider_id = ?",
            )
            .bind(session_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        })
        .await
    }

    async fn time_since_last_bid(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<Duration>, StoreError> {
        profiled("time_since_last_bid", async {
            let latest = sqlx::query_scalar::<_, Option<i64>>(
                "SELECT MAX(placed_at) FROM bids WHERE session_id = ? AND provider_id = ?",
            )
            .bind(session_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

            match latest {
                Some(millis) => {
                    let placed_at = parse_millis("bid", session_id, millis)?;
                    Ok(Some(Utc::now() - placed_at))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn count_distinct_bidders(&self, session_id: i64) -> Result<i64, StoreError> {
        profiled("count_distinct_bidders", async {
            let count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(DISTINCT provider_id) FROM bids WHERE session_id = ?",
            )
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
