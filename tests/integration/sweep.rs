//! Expiry sweep against a live store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use tender_agents::auction::sweeper::{SweepReport, Sweeper};
use tender_agents::auction::Auctioneer;
use tender_agents::error::{AuctionError, StoreError};
use tender_agents::storage::memory::InMemoryStore;
use tender_agents::storage::{BidStore, SessionStore};
use tender_agents::types::{Session, SessionStatus};

use crate::support::session;

async fn status(store: &InMemoryStore, id: i64) -> SessionStatus {
    store.get_session(id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_sweep_closes_only_expired_sessions() {
    let store = Arc::new(InMemoryStore::new());
    let quiet = store.insert_session(session(90)).await.id;
    let contested = store.insert_session(session(90)).await.id;
    let running = store.insert_session(session(10)).await.id;

    let start = store.get_session(contested).await.unwrap().unwrap().start_time;
    Auctioneer::new(store.clone())
        .make_bid_at(contested, 5, start + Duration::minutes(20))
        .await
        .unwrap();

    let report = Sweeper::new(store.clone()).run_once().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            checked: 3,
            finished: 1,
            did_not_take_place: 1,
            failed: 0,
        }
    );

    assert_eq!(status(&store, quiet).await, SessionStatus::DidNotTakePlace);
    assert_eq!(status(&store, contested).await, SessionStatus::Finished);
    assert_eq!(status(&store, running).await, SessionStatus::Active);

    // A second pass has nothing left to do
    let again = Sweeper::new(store.clone()).run_once().await.unwrap();
    assert_eq!(again.checked, 1);
    assert_eq!(again.closed(), 0);
}

#[tokio::test]
async fn test_late_bids_accepted_until_sweep_runs() {
    let store = Arc::new(InMemoryStore::new());
    let id = store.insert_session(session(61)).await.id;
    let auctioneer = Auctioneer::new(store.clone());

    // Deadline passed without an extension: the bid still lands
    let bid = auctioneer.make_bid(id, 3).await.unwrap();
    assert_eq!(bid.sequence, 0);
    let after_bid = store.get_session(id).await.unwrap().unwrap();
    assert!(!after_bid.in_additional_purchase);

    Sweeper::new(store.clone()).run_once().await.unwrap();
    let err = auctioneer.make_bid(id, 4).await.unwrap_err();
    assert!(matches!(
        err,
        AuctionError::SessionNotActive {
            status: SessionStatus::Finished,
            ..
        }
    ));
}

#[tokio::test]
async fn test_expired_additional_purchase_is_swept() {
    let store = Arc::new(InMemoryStore::new());
    let id = store.insert_session(session(58)).await.id;
    let auctioneer = Auctioneer::new(store.clone());
    auctioneer.make_bid(id, 3).await.unwrap();

    let extended = store.get_session(id).await.unwrap().unwrap();
    assert!(extended.in_additional_purchase);

    let report = Sweeper::new(store.clone())
        .run_at(extended.end_time() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(report.finished, 1);

    let err = auctioneer.make_bid(id, 4).await.unwrap_err();
    assert!(matches!(err, AuctionError::SessionNotActive { .. }));
}

/// Lets provider 9 bid on every listed session right after the listing, as a
/// competing request would between the sweep's read and its write.
struct BidAfterListing {
    inner: Arc<InMemoryStore>,
}

#[async_trait]
impl SessionStore for BidAfterListing {
    async fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        self.inner.get_session(id).await
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.update_session(session).await
    }

    async fn close_expired(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionStatus>, StoreError> {
        self.inner.close_expired(id, now).await
    }

    async fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<Session>, StoreError> {
        let listed = self.inner.list_sessions_by_status(status).await?;
        for session in &listed {
            self.inner
                .insert_bid(session.id, 9, Utc::now())
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        Ok(listed)
    }
}

#[tokio::test]
async fn test_bid_between_listing_and_close_survives_sweep() {
    let store = Arc::new(InMemoryStore::new());
    let id = store.insert_session(session(75)).await.id;

    let sweeper = Sweeper::new(Arc::new(BidAfterListing {
        inner: store.clone(),
    }));
    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.finished, 1);
    assert_eq!(report.did_not_take_place, 0);

    let stored = store.get_session(id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Finished);
    assert_eq!(stored.current_price, Decimal::from(90));
    assert_eq!(stored.last_bid.map(|b| b.provider_id), Some(9));
    assert_eq!(store.bids_for(id).await.len(), 1);
}
