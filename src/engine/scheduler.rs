//! Agent scheduler.
//!
//! Owns the registry of running agents. Starting an agent places one bid
//! straight away and then hands the session to a background polling task.
//! The registry lock is never held across a store call.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::runner::AgentRunner;
use super::{AgentInfo, AgentKey, StartRequest};
use crate::auction::Auctioneer;
use crate::error::AgentError;
use crate::storage::AuctionStore;
use crate::strategy::Strategy;

struct AgentHandle {
    info: AgentInfo,
    cancel: Arc<AtomicBool>,
    /// `None` while the initial bid is in flight.
    task: Option<JoinHandle<()>>,
}

pub struct AgentScheduler {
    store: Arc<dyn AuctionStore>,
    auctioneer: Arc<Auctioneer>,
    registry: Mutex<HashMap<AgentKey, AgentHandle>>,
}

impl AgentScheduler {
    pub fn new(store: Arc<dyn AuctionStore>) -> Self {
        let auctioneer = Arc::new(Auctioneer::new(store.clone()));
        Self {
            store,
            auctioneer,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Launch an agent for `request`.
    ///
    /// Fails without side effects on an unknown strategy, bad thresholds or
    /// a key that already has an agent. If the initial bid is rejected the
    /// agent is unregistered again and the bid error is returned.
    ///
    /// If the agent is stopped while its initial bid is in flight, the bid
    /// stands but no polling task is spawned and `AgentError::NotFound` is
    /// returned.
    pub async fn start(&self, request: StartRequest) -> Result<AgentInfo, AgentError> {
        let strategy = Strategy::by_name(&request.strategy)?;
        strategy.validate()?;
        request
            .thresholds
            .validate()
            .map_err(AgentError::InvalidThresholds)?;

        let key = request.key();
        let cancel = Arc::new(AtomicBool::new(false));
        let info = AgentInfo {
            key,
            strategy: strategy.name.clone(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };

        {
            let mut registry = self.registry.lock().await;
            if registry.contains_key(&key) {
                return Err(AgentError::AlreadyRunning {
                    session_id: key.session_id,
                    user_id: key.user_id,
                });
            }
            registry.insert(
                key,
                AgentHandle {
                    info: info.clone(),
                    cancel: cancel.clone(),
                    task: None,
                },
            );
        }

        if let Err(e) = self.auctioneer.make_bid(key.session_id, key.user_id).await {
            self.unregister(key, info.run_id).await;
            warn!(
                session_id = key.session_id,
                user_id = key.user_id,
                error = %e,
                "Initial bid failed, agent not started"
            );
            return Err(e.into());
        }

        let runner = AgentRunner {
            key,
            run_id: info.run_id,
            strategy,
            thresholds: request.thresholds,
            store: self.store.clone(),
            auctioneer: self.auctioneer.clone(),
            cancel,
        };

        {
            let mut registry = self.registry.lock().await;
            match registry.get_mut(&key) {
                Some(handle) if handle.info.run_id == info.run_id => {
                    handle.task = Some(tokio::spawn(runner.run()));
                }
                _ => {
                    info!(
                        session_id = key.session_id,
                        user_id = key.user_id,
                        run_id = %info.run_id,
                        "Agent stopped during its initial bid"
                    );
                    return Err(AgentError::NotFound {
                        session_id: key.session_id,
                        user_id: key.user_id,
                    });
                }
            }
        }

        info!(
            session_id = key.session_id,
            user_id = key.user_id,
            run_id = %info.run_id,
            strategy = %info.strategy,
            "Agent started"
        );
        Ok(info)
    }

    /// Signal the agent for (`session_id`, `user_id`) to stop and forget it.
    /// The task exits at its next tick.
    pub async fn stop(&self, session_id: i64, user_id: i64) -> Result<(), AgentError> {
        let key = AgentKey {
            session_id,
            user_id,
        };
        let handle = self
            .registry
            .lock()
            .await
            .remove(&key)
            .ok_or(AgentError::NotFound {
                session_id,
                user_id,
            })?;

        handle.cancel.store(true, Ordering::SeqCst);
        info!(
            session_id,
            user_id,
            run_id = %handle.info.run_id,
            "Agent stopped"
        );
        Ok(())
    }

    /// Agents currently registered, ordered by key.
    pub async fn running(&self) -> Vec<AgentInfo> {
        let registry = self.registry.lock().await;
        let mut agents: Vec<AgentInfo> = registry.values().map(|h| h.info.clone()).collect();
        agents.sort_by_key(|a| a.key);
        agents
    }

    /// Cancel every agent and wait for their loops to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<AgentHandle> = self
            .registry
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        let count = handles.len();
        let tasks: Vec<JoinHandle<()>> = handles
            .into_iter()
            .filter_map(|handle| {
                handle.cancel.store(true, Ordering::SeqCst);
                handle.task
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Agent task ended abnormally");
            }
        }
        info!(agents = count, "All agents stopped");
    }

    async fn unregister(&self, key: AgentKey, run_id: Uuid) {
        let mut registry = self.registry.lock().await;
        if registry.get(&key).is_some_and(|h| h.info.run_id == run_id) {
            registry.remove(&key);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
