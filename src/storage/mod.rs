//! Persistence layer.
//!
//! The agents only need a narrow view of the tender service's data: the
//! session store and the bid store. Both are traits so the scheduler can run
//! against SQLite in production and an in-memory store in tests.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::time::Instant;
use tracing::debug;

use crate::error::{AuctionError, StoreError};
use crate::types::{Bid, Session, SessionStatus};

/// Result of the accept-bid transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum BidOutcome {
    /// The bid was inserted and the session updated.
    Placed(Bid),
    /// The additional purchase had already run out: no bid was inserted and
    /// the session was closed.
    Expired,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Session with its last bid and product lines, `None` if unknown.
    async fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError>;

    /// Overwrite a session's mutable columns. Fails with
    /// `StoreError::SessionClosed` once the stored session is terminal.
    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Close the session if its deadline has passed at `now`, writing only the
    /// status. The decision is taken on the stored row, so a bid accepted
    /// after the caller last read the session still counts. Returns the new
    /// status, or `None` if the session is still open or already closed.
    async fn close_expired(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionStatus>, StoreError>;

    async fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<Session>, StoreError>;
}

#[async_trait]
pub trait BidStore: Send + Sync {
    /// Run the accept-bid transaction for `provider_id` at time `at`.
    ///
    /// Implementations load the session, apply
    /// [`crate::auction::transition::apply_bid`], then insert the bid and
    /// write the session back atomically. Nothing is written on error.
    async fn insert_bid(
        &self,
        session_id: i64,
        provider_id: i64,
        at: DateTime<Utc>,
    ) -> Result<BidOutcome, AuctionError>;

    async fn count_bids(&self, session_id: i64, user_id: i64) -> Result<i64, StoreError>;

    /// Time since the user's latest bid in the session, `None` if they never bid.
    async fn time_since_last_bid(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<Duration>, StoreError>;

    async fn count_distinct_bidders(&self, session_id: i64) -> Result<i64, StoreError>;
}

/// Everything the agents need from storage.
pub trait AuctionStore: SessionStore + BidStore {}

impl<T: SessionStore + BidStore> AuctionStore for T {}

/// Await a store call, logging its duration at debug level when it succeeds.
pub(crate) async fn profiled<T, E, F>(op: &'static str, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = call.await;
    if result.is_ok() {
        debug!(
            op,
            elapsed_ms = format!("{:.3}", started.elapsed().as_secs_f64() * 1000.0),
            "Store call complete"
        );
    }
    result
}
