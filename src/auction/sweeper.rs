//! Expiry sweep.
//!
//! Closes every active session whose deadline has passed. Sessions in the
//! additional purchase are closed the same way once their extended deadline
//! runs out.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::transition::closing_status;
use crate::error::StoreError;
use crate::storage::SessionStore;
use crate::types::SessionStatus;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Active sessions examined.
    pub checked: usize,
    pub finished: usize,
    pub did_not_take_place: usize,
    /// Sessions whose update failed; they are retried on the next pass.
    pub failed: usize,
}

impl SweepReport {
    pub fn closed(&self) -> usize {
        self.finished + self.did_not_take_place
    }
}

pub struct Sweeper {
    store: Arc<dyn SessionStore>,
}

impl Sweeper {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn run_once(&self) -> Result<SweepReport, StoreError> {
        self.run_at(Utc::now()).await
    }

    /// Sweep as of `now`. Only listing the sessions can fail the whole pass;
    /// a failed close is counted and logged.
    ///
    /// The listing only picks candidates. The store decides the final status
    /// from the row as it stands when closing, so a bid accepted in between
    /// is kept.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let sessions = self.store.list_sessions_by_status(SessionStatus::Active).await?;
        let mut report = SweepReport {
            checked: sessions.len(),
            ..SweepReport::default()
        };

        for session in sessions {
            if closing_status(&session, now).is_none() {
                continue;
            }

            match self.store.close_expired(session.id, now).await {
                Ok(Some(status)) => {
                    info!(session_id = session.id, status = %status, "Session closed");
                    match status {
                        SessionStatus::Finished => report.finished += 1,
                        _ => report.did_not_take_place += 1,
                    }
                }
                // A concurrent bid closed it first
                Ok(None) => debug!(session_id = session.id, "Session already closed"),
                Err(e) => {
                    warn!(session_id = session.id, error = %e, "Failed to close session");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run the sweep every `every` until the task is aborted.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            info!(interval_secs = every.as_secs(), "Session sweep scheduled");
            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(report) if report.closed() > 0 || report.failed > 0 => {
                        info!(
                            checked = report.checked,
                            finished = report.finished,
                            did_not_take_place = report.did_not_take_place,
                            failed = report.failed,
                            "Sweep complete"
                        );
                    }
                    Ok(report) => debug!(checked = report.checked, "Sweep complete"),
                    Err(e) => error!(error = %e, "Sweep failed, retrying next interval"),
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
