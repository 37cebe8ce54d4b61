//! Error types.
//!
//! Every layer has its own enum. `ErrorKind` folds them back into the four
//! categories callers branch on.

use thiserror::Error;

use crate::types::SessionStatus;

/// Coarse category shared by all errors in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    TransientStore,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: i64,
        reason: String,
    },

    #[error("session {0} is closed and can no longer be updated")]
    SessionClosed(i64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::SessionClosed(_) => ErrorKind::Conflict,
            _ => ErrorKind::TransientStore,
        }
    }
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("strategy {strategy} references unknown field {field}")]
    UnknownField { strategy: String, field: String },

    #[error("strategy {0} has a zero tick interval")]
    ZeroTick(String),
}

#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("session {0} not found")]
    SessionNotFound(i64),

    #[error("cannot make bid: session {session_id} is {status}")]
    SessionNotActive {
        session_id: i64,
        status: SessionStatus,
    },

    #[error("cannot make bid: provider {provider_id} made the last bid in session {session_id}")]
    ProviderMadeLastBid { session_id: i64, provider_id: i64 },

    #[error("cannot make bid: additional purchase in session {session_id} is over")]
    DeadlinePassed { session_id: i64 },

    #[error("cannot make bid: price step of session {session_id} overflows")]
    PriceOverflow { session_id: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuctionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuctionError::SessionNotFound(_) => ErrorKind::NotFound,
            AuctionError::SessionNotActive { .. }
            | AuctionError::ProviderMadeLastBid { .. }
            | AuctionError::DeadlinePassed { .. } => ErrorKind::Conflict,
            AuctionError::PriceOverflow { .. } => ErrorKind::Validation,
            AuctionError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent for session {session_id} user {user_id} is already running")]
    AlreadyRunning { session_id: i64, user_id: i64 },

    #[error("no agent running for session {session_id} user {user_id}")]
    NotFound { session_id: i64, user_id: i64 },

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("initial bid failed: {0}")]
    InitialBid(#[from] AuctionError),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::AlreadyRunning { .. } => ErrorKind::Conflict,
            AgentError::NotFound { .. } => ErrorKind::NotFound,
            AgentError::Strategy(_) | AgentError::InvalidThresholds(_) => ErrorKind::Validation,
            AgentError::InitialBid(e) => e.kind(),
        }
    }
}
