//! Active experiment registry
//!
//! The registry is the single structure shared between the lifecycle
//! service (writer) and the router, ledger, and monitor loops (readers).
//! Entries hold the immutable configuration snapshot taken at start time,
//! so hot-path reads never need synchronization with lifecycle transitions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::domain::experiment::ExperimentConfig;

/// A registered, actively running experiment
#[derive(Debug)]
pub struct ActiveExperiment {
    pub config: ExperimentConfig,
    pub started_at: DateTime<Utc>,
    /// Woken when the experiment is deregistered; lets the monitor loop
    /// exit promptly instead of sleeping out its full interval
    pub stopped: Notify,
}

impl ActiveExperiment {
    /// Hours elapsed since the experiment started
    pub fn elapsed_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// Concurrency-safe map of currently running experiments
#[derive(Debug, Default)]
pub struct ActiveRegistry {
    inner: DashMap<String, Arc<ActiveExperiment>>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an experiment as active
    pub fn register(
        &self,
        config: ExperimentConfig,
        started_at: DateTime<Utc>,
    ) -> Arc<ActiveExperiment> {
        let entry = Arc::new(ActiveExperiment {
            config,
            started_at,
            stopped: Notify::new(),
        });
        self.inner
            .insert(entry.config.test_id().to_string(), entry.clone());
        entry
    }

    /// Look up an active experiment
    pub fn get(&self, test_id: &str) -> Option<Arc<ActiveExperiment>> {
        self.inner.get(test_id).map(|e| e.value().clone())
    }

    /// Check whether an experiment is active
    pub fn contains(&self, test_id: &str) -> bool {
        self.inner.contains_key(test_id)
    }

    /// Deregister an experiment, waking its monitor
    ///
    /// `notify_one` stores a permit, so the wakeup is not lost when the
    /// monitor is mid-iteration rather than parked on `notified()`.
    pub fn deregister(&self, test_id: &str) -> bool {
        match self.inner.remove(test_id) {
            Some((_, entry)) => {
                entry.stopped.notify_one();
                true
            }
            None => false,
        }
    }

    /// Ids of all active experiments
    pub fn active_ids(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
