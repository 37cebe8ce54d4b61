//! Agents running end to end against the in-memory store.
//!
//! The single-threaded tests run on a paused clock: sleeping past a tick
//! advances tokio time instantly once every task is idle. Session
//! timestamps still come from the wall clock.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use tender_agents::auction::Auctioneer;
use tender_agents::engine::scheduler::AgentScheduler;
use tender_agents::engine::AgentKey;
use tender_agents::error::{AgentError, AuctionError, ErrorKind, StoreError};
use tender_agents::storage::SessionStore;

use crate::support::{memory_store_with, request, session, settle};

/// Just past the 5 s tick of the aggressive and waiting strategies.
const ONE_TICK: Duration = Duration::from_millis(5_500);

#[tokio::test(start_paused = true)]
async fn test_agent_outbids_competitor() {
    let (store, id) = memory_store_with(session(10)).await;
    let scheduler = AgentScheduler::new(store.clone());
    let competitor = Auctioneer::new(store.clone());

    scheduler.start(request(id, 1, "aggressive", 10.0)).await.unwrap();
    competitor.make_bid(id, 2).await.unwrap();
    tokio::time::sleep(ONE_TICK).await;
    scheduler.stop(id, 1).await.unwrap();

    let bids = store.bids_for(id).await;
    let providers: Vec<i64> = bids.iter().map(|b| b.provider_id).collect();
    assert_eq!(providers, vec![1, 2, 1]);
    assert!(bids.iter().all(|b| b.automated));
    assert_eq!(
        store.get_session(id).await.unwrap().unwrap().current_price,
        Decimal::from(70)
    );
}

#[tokio::test(start_paused = true)]
async fn test_waiting_agent_rejoins_during_additional_purchase() {
    // Three minutes left: the initial bid opens the additional purchase
    let (store, id) = memory_store_with(session(57)).await;
    let scheduler = AgentScheduler::new(store.clone());
    let competitor = Auctioneer::new(store.clone());

    scheduler.start(request(id, 1, "waiting", 10.0)).await.unwrap();
    let extended = store.get_session(id).await.unwrap().unwrap();
    assert!(extended.in_additional_purchase);
    assert_eq!(extended.duration_minutes, 65);

    competitor.make_bid(id, 2).await.unwrap();
    tokio::time::sleep(ONE_TICK).await;
    scheduler.shutdown().await;

    let providers: Vec<i64> = store.bids_for(id).await.iter().map(|b| b.provider_id).collect();
    assert_eq!(providers, vec![1, 2, 1]);
    let session = store.get_session(id).await.unwrap().unwrap();
    assert_eq!(session.duration_minutes, 75);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_agent_no_longer_bids() {
    let (store, id) = memory_store_with(session(10)).await;
    let scheduler = AgentScheduler::new(store.clone());

    scheduler.start(request(id, 1, "aggressive", 10.0)).await.unwrap();
    scheduler.stop(id, 1).await.unwrap();
    Auctioneer::new(store.clone()).make_bid(id, 2).await.unwrap();
    settle().await;

    let providers: Vec<i64> = store.bids_for(id).await.iter().map(|b| b.provider_id).collect();
    assert_eq!(providers, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_registry_uniqueness() {
    let (store, first) = memory_store_with(session(10)).await;
    let second = store.insert_session(session(5)).await.id;
    let scheduler = AgentScheduler::new(store.clone());

    scheduler.start(request(first, 1, "waiting", 10.0)).await.unwrap();
    scheduler.start(request(second, 1, "waiting", 10.0)).await.unwrap();
    scheduler.start(request(first, 2, "progressive", 10.0)).await.unwrap();

    let err = scheduler.start(request(first, 1, "progressive", 10.0)).await.unwrap_err();
    assert!(matches!(err, AgentError::AlreadyRunning { .. }));

    let err = scheduler.stop(second, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let keys: Vec<AgentKey> = scheduler.running().await.iter().map(|a| a.key).collect();
    assert_eq!(
        keys,
        vec![
            AgentKey { session_id: first, user_id: 1 },
            AgentKey { session_id: first, user_id: 2 },
            AgentKey { session_id: second, user_id: 1 },
        ]
    );

    scheduler.shutdown().await;
    assert!(scheduler.running().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_while_store_is_down() {
    let (store, id) = memory_store_with(session(10)).await;
    let scheduler = AgentScheduler::new(store.clone());

    store.set_error("connection refused");
    let err = scheduler.start(request(id, 1, "aggressive", 10.0)).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::InitialBid(AuctionError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(err.kind(), ErrorKind::TransientStore);
    assert!(scheduler.running().await.is_empty());

    store.clear_error();
    scheduler.start(request(id, 1, "aggressive", 10.0)).await.unwrap();
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bids_keep_sequence_contiguous() {
    let (store, id) = memory_store_with(session(10)).await;
    let auctioneer = Arc::new(Auctioneer::new(store.clone()));

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let auctioneer = auctioneer.clone();
            tokio::spawn(async move { auctioneer.make_bid(id, 100 + i % 4).await })
        })
        .collect();
    for task in tasks {
        match task.await.unwrap() {
            Ok(_)
            | Err(AuctionError::ProviderMadeLastBid { .. })
            | Err(AuctionError::SessionNotActive { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let bids = store.bids_for(id).await;
    assert!(!bids.is_empty());
    for (i, bid) in bids.iter().enumerate() {
        assert_eq!(bid.sequence, i as i64);
    }
    for pair in bids.windows(2) {
        assert_ne!(pair[0].provider_id, pair[1].provider_id);
        assert!(pair[1].resulting_price < pair[0].resulting_price);
    }
    assert!(bids.len() <= 10);
}
