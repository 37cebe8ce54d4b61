//! In-memory store.
//!
//! Keeps sessions and bids in plain tables behind one async mutex. The lock
//! is held for the whole accept-bid transaction, which gives the same
//! all-or-nothing behaviour as the SQL store. Used by tests and by the
//! `memory` backend for local runs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

use super::{BidOutcome, BidStore, SessionStore};
use crate::auction::transition::{apply_bid, closing_status, Transition};
use crate::error::{AuctionError, StoreError};
use crate::types::{Bid, Session, SessionStatus};

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<i64, Session>,
    bids: Vec<Bid>,
    next_session_id: i64,
    next_bid_id: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    /// If set, every call fails with `StoreError::Unavailable`.
    force_error: StdMutex<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, assigning a fresh id. Returns the stored copy.
    pub async fn insert_session(&self, mut session: Session) -> Session {
        let mut tables = self.tables.lock().await;
        tables.next_session_id += 1;
        session.id = tables.next_session_id;
        session.last_bid = None;
        tables.sessions.insert(session.id, session.clone());
        session
    }

    /// All bids of a session in sequence order.
    pub async fn bids_for(&self, session_id: i64) -> Vec<Bid> {
        let tables = self.tables.lock().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .iter()
            .filter(|b| b.session_id == session_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| b.sequence);
        bids
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match self
            .force_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            Some(msg) => Err(StoreError::Unavailable(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let stored = tables
            .sessions
            .get_mut(&session.id)
            .ok_or(StoreError::Corrupt {
                entity: "session",
                id: session.id,
                reason: "no such row".to_string(),
            })?;
        if stored.status.is_terminal() {
            return Err(StoreError::SessionClosed(session.id));
        }
        *stored = session.clone();
        Ok(())
    }

    async fn close_expired(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionStatus>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let stored = tables.sessions.get_mut(&id).ok_or(StoreError::Corrupt {
            entity: "session",
            id,
            reason: "no such row".to_string(),
        })?;
        let closed = closing_status(stored, now);
        if let Some(status) = closed {
            stored.status = status;
        }
        Ok(closed)
    }

    async fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<Session>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.id);
        Ok(sessions)
    }
}

#[async_trait]
impl BidStore for InMemoryStore {
    async fn insert_bid(
        &self,
        session_id: i64,
        provider_id: i64,
        at: DateTime<Utc>,
    ) -> Result<BidOutcome, AuctionError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        // Work on a copy so an error leaves the table untouched
        let mut session = tables
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(AuctionError::SessionNotFound(session_id))?;

        let outcome = match apply_bid(&mut session, provider_id, at)? {
            Transition::Accepted(pending) => {
                tables.next_bid_id += 1;
                let bid = pending.into_bid(tables.next_bid_id, session_id);
                tables.bids.push(bid.clone());
                session.last_bid = Some(bid.clone());
                BidOutcome::Placed(bid)
            }
            Transition::Expired => BidOutcome::Expired,
        };
        tables.sessions.insert(session_id, session);
        Ok(outcome)
    }

    async fn count_bids(&self, session_id: i64, user_id: i64) -> Result<i64, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let count = tables
            .bids
            .iter()
            .filter(|b| b.session_id == session_id && b.provider_id == user_id)
            .count();
        Ok(count as i64)
    }

    async fn time_since_last_bid(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<Duration>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let latest = tables
            .bids
            .iter()
            .filter(|b| b.session_id == session_id && b.provider_id == user_id)
            .map(|b| b.placed_at)
            .max();
        Ok(latest.map(|t| Utc::now() - t))
    }

    async fn count_distinct_bidders(&self, session_id: i64) -> Result<i64, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let bidders: HashSet<i64> = tables
            .bids
            .iter()
            .filter(|b| b.session_id == session_id)
            .map(|b| b.provider_id)
            .collect();
        Ok(bidders.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
