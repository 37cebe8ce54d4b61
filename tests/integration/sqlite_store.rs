//! The scheduler and sweep running on the SQLite store.

use rust_decimal::Decimal;
use std::sync::Arc;

use tender_agents::auction::sweeper::Sweeper;
use tender_agents::auction::Auctioneer;
use tender_agents::engine::scheduler::AgentScheduler;
use tender_agents::error::{AgentError, AuctionError};
use tender_agents::storage::sqlite::SqliteStore;
use tender_agents::storage::{BidStore, SessionStore};
use tender_agents::types::SessionStatus;

use crate::support::{request, session, settle};

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap())
}

#[tokio::test]
async fn test_agent_lifecycle_on_sqlite() {
    let store = store().await;
    let id = store.insert_session(&session(10)).await.unwrap().id;
    let scheduler = AgentScheduler::new(store.clone());

    scheduler.start(request(id, 7, "waiting", 10.0)).await.unwrap();
    let err = scheduler.start(request(id, 7, "waiting", 10.0)).await.unwrap_err();
    assert!(matches!(err, AgentError::AlreadyRunning { .. }));

    Auctioneer::new(store.clone()).make_bid(id, 8).await.unwrap();
    settle().await;
    scheduler.stop(id, 7).await.unwrap();

    // Waiting bids once and then holds back
    assert_eq!(store.count_bids(id, 7).await.unwrap(), 1);
    assert_eq!(store.count_distinct_bidders(id).await.unwrap(), 2);

    let session = store.get_session(id).await.unwrap().unwrap();
    assert_eq!(session.current_price, Decimal::from(80));
    let last = session.last_bid.unwrap();
    assert_eq!(last.provider_id, 8);
    assert_eq!(last.sequence, 1);
    assert_eq!(session.products.len(), 2);
}

#[tokio::test]
async fn test_price_reaches_zero_and_session_finishes() {
    let store = store().await;
    let id = store.insert_session(&session(10)).await.unwrap().id;
    let auctioneer = Auctioneer::new(store.clone());

    for step in 0..10 {
        let bid = auctioneer.make_bid(id, 1 + step % 2).await.unwrap();
        assert_eq!(bid.sequence, step);
        assert_eq!(bid.resulting_price, Decimal::from(90 - 10 * step));
    }

    let session = store.get_session(id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Finished);
    assert_eq!(session.current_price, Decimal::ZERO);

    let err = auctioneer.make_bid(id, 2).await.unwrap_err();
    assert!(matches!(err, AuctionError::SessionNotActive { .. }));
}

#[tokio::test]
async fn test_sweep_on_sqlite() {
    let store = store().await;
    let expired = store.insert_session(&session(75)).await.unwrap().id;
    let open = store.insert_session(&session(5)).await.unwrap().id;

    let report = Sweeper::new(store.clone()).run_once().await.unwrap();
    assert_eq!(report.did_not_take_place, 1);
    assert_eq!(report.finished, 0);

    let closed = store
        .list_sessions_by_status(SessionStatus::DidNotTakePlace)
        .await
        .unwrap();
    assert_eq!(closed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![expired]);
    let active = store.list_sessions_by_status(SessionStatus::Active).await.unwrap();
    assert_eq!(active.iter().map(|s| s.id).collect::<Vec<_>>(), vec![open]);
}
