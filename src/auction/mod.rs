//! Auction state machine.
//!
//! `transition` holds the pure accept-bid and expiry rules. The `Auctioneer`
//! runs bids through a store transaction; the `Sweeper` closes sessions whose
//! deadline has passed.

pub mod sweeper;
pub mod transition;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AuctionError;
use crate::storage::{AuctionStore, BidOutcome};
use crate::types::Bid;

/// Places bids on behalf of providers.
pub struct Auctioneer {
    store: Arc<dyn AuctionStore>,
}

impl Auctioneer {
    pub fn new(store: Arc<dyn AuctionStore>) -> Self {
        Self { store }
    }

    /// Place a bid for `provider_id` at the current time.
    pub async fn make_bid(&self, session_id: i64, provider_id: i64) -> Result<Bid, AuctionError> {
        self.make_bid_at(session_id, provider_id, Utc::now()).await
    }

    /// Place a bid as if it arrived at `at`.
    pub async fn make_bid_at(
        &self,
        session_id: i64,
        provider_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Bid, AuctionError> {
        match self.store.insert_bid(session_id, provider_id, at).await? {
            BidOutcome::Placed(bid) => {
                info!(
                    session_id,
                    provider_id,
                    sequence = bid.sequence,
                    price = %bid.resulting_price,
                    "Bid placed"
                );
                Ok(bid)
            }
            BidOutcome::Expired => {
                debug!(session_id, provider_id, "Additional purchase over, session closed");
                Err(AuctionError::DeadlinePassed { session_id })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
