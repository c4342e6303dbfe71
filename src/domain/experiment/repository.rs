//! Repository and collaborator traits
//!
//! The control plane depends on three narrow interfaces: the durable
//! experiment store (system of record), the read-only variant catalog, and
//! the rollback/notification collaborator. Any storage engine can satisfy
//! the store trait; the experiment logic never depends on a query language.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::analysis::Analysis;
use super::entity::Experiment;
use super::observation::MetricObservation;
use super::state::ExperimentState;
use crate::domain::error::DomainError;

// ============================================================================
// ObservationQuery
// ============================================================================

/// Query parameters for metric observations
#[derive(Debug, Clone, Default)]
pub struct ObservationQuery {
    pub test_id: String,
    /// Filter by metric name
    pub metric: Option<String>,
    /// Filter by variant name
    pub variant: Option<String>,
    /// Inclusive lower time bound
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper time bound
    pub end_time: Option<DateTime<Utc>>,
}

impl ObservationQuery {
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Check whether an observation matches this query
    pub fn matches(&self, observation: &MetricObservation) -> bool {
        if observation.test_id != self.test_id {
            return false;
        }
        if let Some(ref metric) = self.metric {
            if &observation.metric != metric {
                return false;
            }
        }
        if let Some(ref variant) = self.variant {
            if &observation.variant != variant {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if observation.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if observation.timestamp > end {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// ExperimentStore
// ============================================================================

/// Durable persistence for experiments, observations, and analyses
#[async_trait]
pub trait ExperimentStore: Send + Sync + Debug {
    /// Insert or replace an experiment
    async fn put_experiment(&self, experiment: Experiment) -> Result<(), DomainError>;

    /// Get an experiment by id
    async fn get_experiment(&self, test_id: &str) -> Result<Option<Experiment>, DomainError>;

    /// Delete an experiment and its observations
    async fn delete_experiment(&self, test_id: &str) -> Result<bool, DomainError>;

    /// List experiments, optionally filtered by state
    async fn list_experiments(
        &self,
        state: Option<ExperimentState>,
    ) -> Result<Vec<Experiment>, DomainError>;

    /// Append an immutable observation
    async fn append_observation(&self, observation: MetricObservation) -> Result<(), DomainError>;

    /// Query observations with filters
    async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<MetricObservation>, DomainError>;

    /// Persist the latest analysis for an experiment
    async fn put_analysis(&self, analysis: Analysis) -> Result<(), DomainError>;

    /// Get the latest persisted analysis for an experiment
    async fn get_analysis(&self, test_id: &str) -> Result<Option<Analysis>, DomainError>;

    /// Check if an experiment exists
    async fn exists(&self, test_id: &str) -> Result<bool, DomainError> {
        Ok(self.get_experiment(test_id).await?.is_some())
    }
}

// ============================================================================
// VariantCatalog
// ============================================================================

/// Read-only lookup confirming a (model, version) pair is deployable
#[async_trait]
pub trait VariantCatalog: Send + Sync + Debug {
    async fn exists(&self, model_id: &str, version: &str) -> Result<bool, DomainError>;
}

// ============================================================================
// RollbackNotifier
// ============================================================================

/// Fire-and-forget sink for safety violation signals
///
/// The control plane only detects and signals; executing a rollback is the
/// collaborator's responsibility.
#[async_trait]
pub trait RollbackNotifier: Send + Sync + Debug {
    async fn on_safety_violation(
        &self,
        test_id: &str,
        variant: &str,
        metric: &str,
        value: f64,
        threshold: f64,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_query_matches_test_id() {
        let obs = MetricObservation::new("exp-1", "control", "accuracy", 0.8);

        assert!(ObservationQuery::new("exp-1").matches(&obs));
        assert!(!ObservationQuery::new("exp-2").matches(&obs));
    }

    #[test]
    fn test_query_matches_metric_and_variant() {
        let obs = MetricObservation::new("exp-1", "control", "accuracy", 0.8);

        assert!(ObservationQuery::new("exp-1")
            .with_metric("accuracy")
            .with_variant("control")
            .matches(&obs));
        assert!(!ObservationQuery::new("exp-1")
            .with_metric("latency_ms")
            .matches(&obs));
        assert!(!ObservationQuery::new("exp-1")
            .with_variant("treatment")
            .matches(&obs));
    }

    #[test]
    fn test_query_time_bounds_are_inclusive() {
        let obs = MetricObservation::new("exp-1", "control", "accuracy", 0.8);
        let ts = obs.timestamp;

        let exact = ObservationQuery::new("exp-1").with_time_range(Some(ts), Some(ts));
        assert!(exact.matches(&obs));

        let before = ObservationQuery::new("exp-1")
            .with_time_range(None, Some(ts - Duration::seconds(1)));
        assert!(!before.matches(&obs));

        let after = ObservationQuery::new("exp-1")
            .with_time_range(Some(ts + Duration::seconds(1)), None);
        assert!(!after.matches(&obs));
    }
}
