//! Per-agent polling loop.
//!
//! Each tick the runner reads the session and the agent's bid statistics,
//! builds a snapshot, asks the strategy for an action and bids when told to.
//! Store failures never end the loop; only the cancellation flag does.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AgentKey;
use crate::auction::Auctioneer;
use crate::error::StoreError;
use crate::storage::AuctionStore;
use crate::strategy::rules::Action;
use crate::strategy::snapshot::{Snapshot, Thresholds};
use crate::strategy::Strategy;
use crate::types::Session;

// ---------------------------------------------------------------------------
// Snapshot building
// ---------------------------------------------------------------------------

/// Raw store reads for one tick.
#[derive(Debug, Clone)]
pub struct Observation {
    pub session: Session,
    pub my_bid_count: i64,
    pub since_my_last_bid: Option<Duration>,
    pub participants: i64,
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Derive the snapshot `user_id` sees at `now`.
pub fn build_snapshot(
    user_id: i64,
    thresholds: Thresholds,
    observation: &Observation,
    now: DateTime<Utc>,
) -> Snapshot {
    let session = &observation.session;
    let since_start = now - session.start_time;

    let (winner, step_number, since_last_step) = match &session.last_bid {
        Some(bid) => (bid.provider_id, bid.sequence, now - bid.placed_at),
        None => (0, 0, since_start),
    };

    let steps_till_zero = if session.step_percent <= Decimal::ZERO {
        i64::MAX
    } else {
        Decimal::ONE_HUNDRED
            .checked_div(session.step_percent)
            .and_then(|steps| steps.floor().to_i64())
            .map_or(i64::MAX, |steps| steps - step_number)
    };

    Snapshot {
        is_on_additional_purchase: session.in_additional_purchase,
        current_winner_id: winner,
        my_id: user_id,
        my_current_bid_count: observation.my_bid_count,
        current_step_number: step_number,
        steps_till_zero,
        current_price: to_f64(session.current_price),
        current_discount: to_f64(session.start_price - session.current_price),
        time_since_last_step: since_last_step,
        time_since_my_last_bid: observation.since_my_last_bid.unwrap_or(since_start),
        step_size: session.step_size().map_or(f64::MAX, to_f64),
        time_since_start: since_start,
        time_till_end: session.remaining_at(now),
        participants_count: observation.participants,
        thresholds,
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct AgentRunner {
    pub key: AgentKey,
    pub run_id: Uuid,
    pub strategy: Strategy,
    pub thresholds: Thresholds,
    pub store: Arc<dyn AuctionStore>,
    pub auctioneer: Arc<Auctioneer>,
    pub cancel: Arc<AtomicBool>,
}

impl AgentRunner {
    /// Poll until cancelled. The flag is read once per tick, so a stop takes
    /// effect within one tick interval.
    pub async fn run(self) {
        info!(
            session_id = self.key.session_id,
            user_id = self.key.user_id,
            run_id = %self.run_id,
            strategy = %self.strategy.name,
            tick_secs = self.strategy.tick.as_secs(),
            "Agent loop started"
        );

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            self.tick().await;
            tokio::time::sleep(self.strategy.tick).await;
        }

        info!(
            session_id = self.key.session_id,
            user_id = self.key.user_id,
            run_id = %self.run_id,
            "Agent loop stopped"
        );
    }

    /// One decision: observe, evaluate, maybe bid.
    async fn tick(&self) {
        let observation = match self.observe().await {
            Ok(Some(observation)) => observation,
            Ok(None) => {
                warn!(
                    session_id = self.key.session_id,
                    run_id = %self.run_id,
                    "Session not found, skipping tick"
                );
                return;
            }
            Err(e) => {
                warn!(
                    session_id = self.key.session_id,
                    run_id = %self.run_id,
                    error = %e,
                    "Store read failed, skipping tick"
                );
                return;
            }
        };

        if !observation.session.is_active() {
            debug!(
                session_id = self.key.session_id,
                status = %observation.session.status,
                "Session closed, nothing to do"
            );
            return;
        }

        let snapshot = build_snapshot(self.key.user_id, self.thresholds, &observation, Utc::now());
        let action = self.strategy.decide(&snapshot);
        debug!(
            session_id = self.key.session_id,
            user_id = self.key.user_id,
            action = %action,
            price = snapshot.current_price,
            "Strategy evaluated"
        );

        if action != Action::Bet {
            return;
        }

        if let Err(e) = self
            .auctioneer
            .make_bid(self.key.session_id, self.key.user_id)
            .await
        {
            warn!(
                session_id = self.key.session_id,
                user_id = self.key.user_id,
                run_id = %self.run_id,
                error = %e,
                "Agent bid rejected"
            );
        }
    }

    async fn observe(&self) -> Result<Option<Observation>, StoreError> {
        let AgentKey { session_id, user_id } = self.key;
        let Some(session) = self.store.get_session(session_id).await? else {
            return Ok(None);
        };
        let my_bid_count = self.store.count_bids(session_id, user_id).await?;
        let since_my_last_bid = self.store.time_since_last_bid(session_id, user_id).await?;
        let participants = self.store.count_distinct_bidders(session_id).await?;

        Ok(Some(Observation {
            session,
            my_bid_count,
            since_my_last_bid,
            participants,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use crate::strategy::presets;
    use crate::types::Bid;
    use rust_decimal_macros::dec;

    fn observation(session: Session) -> Observation {
        Observation {
            session,
            my_bid_count: 0,
            since_my_last_bid: None,
            participants: 0,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds::new(20.0, 50.0, 80.0)
    }

    #[test]
    fn test_snapshot_before_any_bid() {
        let session = Session::sample();
        let now = session.start_time + Duration::minutes(10);
        let s = build_snapshot(42, thresholds(), &observation(session), now);

        assert_eq!(s.my_id, 42);
        assert_eq!(s.current_winner_id, 0);
        assert_eq!(s.current_step_number, 0);
        assert_eq!(s.steps_till_zero, 10);
        assert_eq!(s.current_price, 100.0);
        assert_eq!(s.current_discount, 0.0);
        assert_eq!(s.step_size, 10.0);
        assert_eq!(s.time_since_start, Duration::minutes(10));
        assert_eq!(s.time_since_last_step, Duration::minutes(10));
        assert_eq!(s.time_since_my_last_bid, Duration::minutes(10));
        assert_eq!(s.time_till_end, Duration::minutes(50));
        assert!(!s.is_on_additional_purchase);
        assert_eq!(s.thresholds, thresholds());
    }

    #[test]
    fn test_snapshot_after_bids() {
        let mut session = Session::sample();
        session.current_price = dec!(70);
        session.last_bid = Some(Bid {
            id: 9,
            session_id: session.id,
            provider_id: 5,
            sequence: 2,
            placed_at: session.start_time + Duration::minutes(20),
            resulting_price: dec!(70),
            automated: false,
        });
        let now = session.start_time + Duration::minutes(30);
        let obs = Observation {
            session,
            my_bid_count: 2,
            since_my_last_bid: Some(Duration::minutes(15)),
            participants: 2,
        };
        let s = build_snapshot(42, thresholds(), &obs, now);

        assert_eq!(s.current_winner_id, 5);
        assert_eq!(s.current_step_number, 2);
        assert_eq!(s.steps_till_zero, 8);
        assert_eq!(s.current_discount, 30.0);
        assert_eq!(s.time_since_last_step, Duration::minutes(10));
        assert_eq!(s.time_since_my_last_bid, Duration::minutes(15));
        assert_eq!(s.my_current_bid_count, 2);
        assert_eq!(s.participants_count, 2);
    }

    #[test]
    fn test_steps_till_zero_rounds_down_and_handles_zero_step() {
        let mut session = Session::sample();
        session.step_percent = dec!(7.3);
        let now = session.start_time;
        let steps = |session: &Session| {
            build_snapshot(1, thresholds(), &observation(session.clone()), now).steps_till_zero
        };
        assert_eq!(steps(&session), 13);

        session.step_percent = Decimal::ZERO;
        assert_eq!(steps(&session), i64::MAX);
    }

    #[test]
    fn test_extreme_decimals_saturate() {
        let mut session = Session::sample();
        let now = session.start_time;

        // 100 / 1e-28 does not fit in a Decimal
        session.step_percent = Decimal::new(1, 28);
        let s = build_snapshot(1, thresholds(), &observation(session.clone()), now);
        assert_eq!(s.steps_till_zero, i64::MAX);

        session.step_percent = dec!(10);
        session.start_price = Decimal::MAX;
        let s = build_snapshot(1, thresholds(), &observation(session), now);
        assert_eq!(s.step_size, f64::MAX);
    }

    #[test]
    fn test_time_till_end_goes_negative() {
        let session = Session::sample();
        let now = session.end_time() + Duration::seconds(30);
        let s = build_snapshot(1, thresholds(), &observation(session), now);
        assert_eq!(s.time_till_end, Duration::seconds(-30));
    }

    fn runner(store: Arc<InMemoryStore>, session_id: i64, user_id: i64) -> AgentRunner {
        AgentRunner {
            key: AgentKey { session_id, user_id },
            run_id: Uuid::new_v4(),
            strategy: presets::waiting(),
            thresholds: thresholds(),
            store: store.clone(),
            auctioneer: Arc::new(Auctioneer::new(store)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test]
    async fn test_tick_bids_when_strategy_says_so() {
        let store = Arc::new(InMemoryStore::new());
        let session = store.insert_session(Session::sample()).await;

        // Waiting enters once: first tick bids, second waits
        let agent = runner(store.clone(), session.id, 8);
        agent.tick().await;
        assert_eq!(store.bids_for(session.id).await.len(), 1);
        agent.tick().await;
        assert_eq!(store.bids_for(session.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_survives_store_failure() {
        let store = Arc::new(InMemoryStore::new());
        let session = store.insert_session(Session::sample()).await;
        let agent = runner(store.clone(), session.id, 8);

        store.set_error("disk full");
        agent.tick().await;
        store.clear_error();
        assert!(store.bids_for(session.id).await.is_empty());

        agent.tick().await;
        assert_eq!(store.bids_for(session.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_runner_exits() {
        let store = Arc::new(InMemoryStore::new());
        let session = store.insert_session(Session::sample()).await;
        let agent = runner(store.clone(), session.id, 8);
        agent.cancel.store(true, Ordering::SeqCst);

        agent.run().await;
        assert!(store.bids_for(session.id).await.is_empty());
    }
}
