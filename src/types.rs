//! Shared types for the tender agents.
//!
//! Sessions and bids are the data the auction state machine mutates and the
//! agents observe. They are kept free of storage concerns so that every
//! store backend can map them in its own way.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Lifecycle status of a quotation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Finished,
    DidNotTakePlace,
}

impl SessionStatus {
    /// Stable textual form, used as the column value by the SQL store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Finished => "FINISHED",
            SessionStatus::DidNotTakePlace => "DIDNT_TAKE_PLACE",
        }
    }

    /// Terminal statuses are absorbing: nothing may change afterwards.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(SessionStatus::Active),
            "FINISHED" => Ok(SessionStatus::Finished),
            "DIDNT_TAKE_PLACE" | "DID_NOT_TAKE_PLACE" => Ok(SessionStatus::DidNotTakePlace),
            _ => Err(anyhow::anyhow!("Unknown session status: {s}")),
        }
    }
}

/// One product line attached to a session (read-only for the agents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLine {
    pub product_id: i64,
    pub quantity: i32,
}

/// A reverse-price auction round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub creator_id: i64,
    pub status: SessionStatus,
    pub start_price: Decimal,
    pub current_price: Decimal,
    /// Percentage of `start_price` removed by every accepted bid.
    pub step_percent: Decimal,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub in_additional_purchase: bool,
    pub last_bid: Option<Bid>,
    pub products: Vec<ProductLine>,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[session {}] {} ({} | price {} of {} | step {}% | ends {})",
            self.id,
            self.name,
            self.status,
            self.current_price,
            self.start_price,
            self.step_percent,
            self.end_time().format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

impl Session {
    /// Current deadline, including any extensions granted so far.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }

    /// Time left until the deadline as seen at `at` (negative once passed).
    pub fn remaining_at(&self, at: DateTime<Utc>) -> Duration {
        self.end_time() - at
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Price removed by a single accepted bid, or `None` if it does not fit
    /// in a `Decimal`.
    pub fn step_size(&self) -> Option<Decimal> {
        self.start_price
            .checked_mul(self.step_percent)?
            .checked_div(Decimal::ONE_HUNDRED)
    }

    /// Helper to build a test session with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        use rust_decimal_macros::dec;
        Session {
            id: 1,
            name: "Office chairs".to_string(),
            creator_id: 7,
            status: SessionStatus::Active,
            start_price: dec!(100),
            current_price: dec!(100),
            step_percent: dec!(10),
            start_time: Utc::now(),
            duration_minutes: 60,
            in_additional_purchase: false,
            last_bid: None,
            products: vec![ProductLine {
                product_id: 3,
                quantity: 12,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Bid
// ---------------------------------------------------------------------------

/// An accepted, price-lowering step in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    pub session_id: i64,
    pub provider_id: i64,
    /// 0-based, contiguous within a session.
    pub sequence: i64,
    pub placed_at: DateTime<Utc>,
    /// Session price right after this bid.
    pub resulting_price: Decimal,
    /// Placed by an agent rather than by hand.
    pub automated: bool,
}

impl fmt::Display for Bid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bid #{} in session {} by provider {} -> {}{}",
            self.sequence,
            self.session_id,
            self.provider_id,
            self.resulting_price,
            if self.automated { " (agent)" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
