//! Pure session transitions: accepting a bid and closing on expiry.
//!
//! Stores call these inside their own transactions; nothing here touches I/O.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::error::AuctionError;
use crate::types::{Bid, Session, SessionStatus};

/// A bid that lands this close to the deadline opens the additional purchase.
pub const EXTENSION_WINDOW_MINUTES: i64 = 5;
/// Minutes added to the deadline per extension.
pub const EXTENSION_MINUTES: i64 = 5;

/// Bid accepted by the state machine but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBid {
    pub provider_id: i64,
    pub sequence: i64,
    pub placed_at: DateTime<Utc>,
    pub resulting_price: Decimal,
}

impl PendingBid {
    /// Materialise the bid once the store has assigned an id.
    pub fn into_bid(self, id: i64, session_id: i64) -> Bid {
        Bid {
            id,
            session_id,
            provider_id: self.provider_id,
            sequence: self.sequence,
            placed_at: self.placed_at,
            resulting_price: self.resulting_price,
            automated: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Insert this bid and write the session back.
    Accepted(PendingBid),
    /// Additional purchase ran out before the bid: write the (now finished)
    /// session back, insert nothing.
    Expired,
}

/// Apply one bid attempt to `session`.
///
/// On `Err` the session is left untouched. On `Ok` the caller must persist
/// the mutated session (and the pending bid, if any) atomically.
pub fn apply_bid(
    session: &mut Session,
    provider_id: i64,
    at: DateTime<Utc>,
) -> Result<Transition, AuctionError> {
    if !session.is_active() {
        return Err(AuctionError::SessionNotActive {
            session_id: session.id,
            status: session.status,
        });
    }

    let was_extended = session.in_additional_purchase;
    if was_extended && session.remaining_at(at) <= Duration::zero() {
        session.status = SessionStatus::Finished;
        return Ok(Transition::Expired);
    }

    let sequence = match &session.last_bid {
        Some(last) if last.provider_id == provider_id => {
            return Err(AuctionError::ProviderMadeLastBid {
                session_id: session.id,
                provider_id,
            });
        }
        Some(last) => last.sequence + 1,
        None => 0,
    };

    let next_price = session
        .step_size()
        .and_then(|step| session.current_price.checked_sub(step.max(Decimal::ZERO)))
        .ok_or(AuctionError::PriceOverflow {
            session_id: session.id,
        })?;
    if next_price <= Decimal::ZERO {
        session.current_price = Decimal::ZERO;
        session.status = SessionStatus::Finished;
    } else {
        session.current_price = next_price;
    }

    if session.is_active() {
        let remaining = session.remaining_at(at);
        if !was_extended {
            if remaining > Duration::zero()
                && remaining <= Duration::minutes(EXTENSION_WINDOW_MINUTES)
            {
                session.in_additional_purchase = true;
                session.duration_minutes += EXTENSION_MINUTES;
            }
        } else {
            session.duration_minutes += EXTENSION_MINUTES;
        }
    }

    Ok(Transition::Accepted(PendingBid {
        provider_id,
        sequence,
        placed_at: at,
        resulting_price: session.current_price,
    }))
}

/// Status an active session should close with at `now`, if its deadline has
/// passed. Sessions in additional purchase expire the same way.
pub fn closing_status(session: &Session, now: DateTime<Utc>) -> Option<SessionStatus> {
    if !session.is_active() || session.end_time() >= now {
        return None;
    }
    if session.last_bid.is_some() {
        Some(SessionStatus::Finished)
    } else {
        Some(SessionStatus::DidNotTakePlace)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
