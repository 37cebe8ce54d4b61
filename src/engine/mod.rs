//! Agent engine: the registry of running agents and their polling loops.

pub mod runner;
pub mod scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::strategy::snapshot::Thresholds;

/// An agent is unique per (session, user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentKey {
    pub session_id: i64,
    pub user_id: i64,
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {} / user {}", self.session_id, self.user_id)
    }
}

/// Request to launch an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub session_id: i64,
    pub user_id: i64,
    /// Name of a predefined strategy.
    pub strategy: String,
    #[serde(flatten)]
    pub thresholds: Thresholds,
}

impl StartRequest {
    pub fn key(&self) -> AgentKey {
        AgentKey {
            session_id: self.session_id,
            user_id: self.user_id,
        }
    }
}

/// Public view of a running agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInfo {
    pub key: AgentKey,
    pub strategy: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}
