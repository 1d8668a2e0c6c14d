//! Queue draining: claim a bounded batch of pending jobs and parse them one
//! by one, converting parse failures into retry or terminal-failure
//! transitions.

pub mod dispatcher;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::CoaConfig;

pub use dispatcher::Dispatcher;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// The batch could not be claimed; nothing was processed.
    #[error("Failed to claim jobs: {0}")]
    Claim(#[from] crate::db::DatabaseError),
}

/// Per-invocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    /// Jobs claimed by this invocation.
    pub claimed: u32,
    /// Jobs parsed successfully.
    pub done: u32,
    /// Jobs whose parse failed (requeued or terminal).
    pub failed: u32,
    /// Failed jobs that went back to pending.
    pub requeued: u32,
    /// Jobs returned unstarted because the time budget ran out.
    pub released: u32,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub default_batch_size: u32,
    pub max_batch_size: u32,
    pub max_attempts: u32,
    /// A claim older than this may be taken over by another drain.
    pub lease: Duration,
    /// Wall-clock budget of one drain.
    pub budget: Duration,
}

impl DispatcherSettings {
    pub fn from_config(config: &CoaConfig) -> Self {
        Self {
            default_batch_size: config.batch_size,
            max_batch_size: config.max_batch_size,
            max_attempts: config.max_attempts,
            lease: Duration::from_secs(config.lease_secs),
            budget: Duration::from_secs(config.budget_secs),
        }
    }

    /// Applies the default and bounds a requested batch size to
    /// `[1, max_batch_size]`.
    pub fn batch_size(&self, requested: Option<u32>) -> u32 {
        let max = self.max_batch_size.max(1);
        requested
            .unwrap_or(self.default_batch_size)
            .clamp(1, max)
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            default_batch_size: 3,
            max_batch_size: 25,
            max_attempts: 5,
            lease: Duration::from_secs(600),
            budget: Duration::from_secs(240),
        }
    }
}
