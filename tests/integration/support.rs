//! Shared fixtures for the integration tests.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use tender_agents::engine::StartRequest;
use tender_agents::storage::memory::InMemoryStore;
use tender_agents::strategy::snapshot::Thresholds;
use tender_agents::types::{ProductLine, Session, SessionStatus};

/// An active session that started `minutes_ago` and runs for an hour,
/// priced at 100 with a 10% step.
pub fn session(minutes_ago: i64) -> Session {
    Session {
        id: 0,
        name: "Steel pipes".to_string(),
        creator_id: 1,
        status: SessionStatus::Active,
        start_price: Decimal::from(100),
        current_price: Decimal::from(100),
        step_percent: Decimal::from(10),
        start_time: Utc::now() - Duration::minutes(minutes_ago),
        duration_minutes: 60,
        in_additional_purchase: false,
        last_bid: None,
        products: vec![
            ProductLine {
                product_id: 10,
                quantity: 200,
            },
            ProductLine {
                product_id: 11,
                quantity: 40,
            },
        ],
    }
}

pub fn request(session_id: i64, user_id: i64, strategy: &str, preferable: f64) -> StartRequest {
    StartRequest {
        session_id,
        user_id,
        strategy: strategy.to_string(),
        thresholds: Thresholds::new(preferable / 4.0, preferable / 2.0, preferable),
    }
}

pub async fn memory_store_with(session: Session) -> (Arc<InMemoryStore>, i64) {
    let store = Arc::new(InMemoryStore::new());
    let id = store.insert_session(session).await.id;
    (store, id)
}

/// Give spawned agent loops a chance to run one tick.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
}
