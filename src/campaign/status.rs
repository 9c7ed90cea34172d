//! The single, process-wide campaign status.
//!
//! Readers get an `Arc` snapshot; writers swap in a fresh value. Nobody holds
//! the lock for longer than a clone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatus {
    pub is_running: bool,
    pub remaining: usize,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub status: RunState,
    pub completed: bool,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CampaignStatus {
    pub fn idle() -> Self {
        Self {
            is_running: false,
            remaining: 0,
            total: 0,
            sent: 0,
            failed: 0,
            status: RunState::Idle,
            completed: false,
            errors: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    fn running(total: usize) -> Self {
        Self {
            is_running: true,
            remaining: total,
            total,
            status: RunState::Running,
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }
}

impl Default for CampaignStatus {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StatusError {
    #[error("A campaign is already running")]
    AlreadyRunning,
    #[error("Cannot reset while a campaign is running")]
    StillRunning,
}

#[derive(Debug, Default)]
pub struct StatusPublisher {
    current: RwLock<Arc<CampaignStatus>>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Arc<CampaignStatus> {
        Arc::clone(&self.current.read())
    }

    pub fn set(&self, status: CampaignStatus) {
        *self.current.write() = Arc::new(status);
    }

    /// Back to idle, unless a run is still going.
    pub fn reset(&self) -> Result<(), StatusError> {
        let mut current = self.current.write();
        if current.is_running {
            return Err(StatusError::StillRunning);
        }
        *current = Arc::new(CampaignStatus::idle());
        Ok(())
    }

    /// Claims the status for a new run of `total` recipients.
    pub(crate) fn begin(&self, total: usize) -> Result<(), StatusError> {
        let mut current = self.current.write();
        if current.is_running {
            return Err(StatusError::AlreadyRunning);
        }
        *current = Arc::new(CampaignStatus::running(total));
        Ok(())
    }

    pub(crate) fn record_sent(&self) {
        self.update(|status| {
            status.sent += 1;
            status.remaining = status.remaining.saturating_sub(1);
        });
    }

    pub(crate) fn record_failure(&self, error: String) {
        self.update(move |status| {
            status.failed += 1;
            status.remaining = status.remaining.saturating_sub(1);
            status.errors.push(error);
        });
    }

    pub(crate) fn finish(&self, stopped_with: Option<String>) {
        self.update(move |status| {
            status.is_running = false;
            status.finished_at = Some(Utc::now());
            match stopped_with {
                None => {
                    status.status = RunState::Completed;
                    status.completed = true;
                }
                Some(reason) => {
                    status.status = RunState::Failed;
                    status.completed = false;
                    status.errors.push(reason);
                }
            }
        });
    }

    fn update(&self, f: impl FnOnce(&mut CampaignStatus)) {
        let mut current = self.current.write();
        let mut next = CampaignStatus::clone(&current);
        f(&mut next);
        *current = Arc::new(next);
    }
}
