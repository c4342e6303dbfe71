//! In-memory implementations of the experiment collaborator traits
//!
//! The store backs tests and single-process deployments. Experiments and
//! analyses live in maps keyed by id; observations live in an append-only
//! vector scanned by query filters.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::error::DomainError;
use crate::domain::experiment::{
    Analysis, Experiment, ExperimentState, ExperimentStore, MetricObservation, ObservationQuery,
    RollbackNotifier, VariantCatalog,
};

// ============================================================================
// InMemoryExperimentStore
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryExperimentStore {
    experiments: RwLock<HashMap<String, Experiment>>,
    observations: RwLock<Vec<MetricObservation>>,
    analyses: RwLock<HashMap<String, Analysis>>,
}

impl InMemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExperimentStore for InMemoryExperimentStore {
    async fn put_experiment(&self, experiment: Experiment) -> Result<(), DomainError> {
        self.experiments
            .write()
            .await
            .insert(experiment.test_id().to_string(), experiment);
        Ok(())
    }

    async fn get_experiment(&self, test_id: &str) -> Result<Option<Experiment>, DomainError> {
        Ok(self.experiments.read().await.get(test_id).cloned())
    }

    async fn delete_experiment(&self, test_id: &str) -> Result<bool, DomainError> {
        let removed = self.experiments.write().await.remove(test_id).is_some();
        if removed {
            self.observations
                .write()
                .await
                .retain(|o| o.test_id != test_id);
            self.analyses.write().await.remove(test_id);
        }
        Ok(removed)
    }

    async fn list_experiments(
        &self,
        state: Option<ExperimentState>,
    ) -> Result<Vec<Experiment>, DomainError> {
        let experiments = self.experiments.read().await;
        let mut matched: Vec<Experiment> = experiments
            .values()
            .filter(|e| state.is_none_or(|s| e.state() == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at().cmp(&b.created_at()));
        Ok(matched)
    }

    async fn append_observation(&self, observation: MetricObservation) -> Result<(), DomainError> {
        self.observations.write().await.push(observation);
        Ok(())
    }

    async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<MetricObservation>, DomainError> {
        Ok(self
            .observations
            .read()
            .await
            .iter()
            .filter(|o| query.matches(o))
            .cloned()
            .collect())
    }

    async fn put_analysis(&self, analysis: Analysis) -> Result<(), DomainError> {
        self.analyses
            .write()
            .await
            .insert(analysis.test_id.clone(), analysis);
        Ok(())
    }

    async fn get_analysis(&self, test_id: &str) -> Result<Option<Analysis>, DomainError> {
        Ok(self.analyses.read().await.get(test_id).cloned())
    }
}

// ============================================================================
// StaticVariantCatalog
// ============================================================================

/// Catalog backed by a fixed set of known (model, version) pairs
#[derive(Debug, Default)]
pub struct StaticVariantCatalog {
    known: HashSet<(String, String)>,
}

impl StaticVariantCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variant(mut self, model_id: impl Into<String>, version: impl Into<String>) -> Self {
        self.known.insert((model_id.into(), version.into()));
        self
    }
}

#[async_trait]
impl VariantCatalog for StaticVariantCatalog {
    async fn exists(&self, model_id: &str, version: &str) -> Result<bool, DomainError> {
        Ok(self
            .known
            .contains(&(model_id.to_string(), version.to_string())))
    }
}

/// Catalog that accepts every variant reference
#[derive(Debug, Default)]
pub struct PermissiveVariantCatalog;

#[async_trait]
impl VariantCatalog for PermissiveVariantCatalog {
    async fn exists(&self, _model_id: &str, _version: &str) -> Result<bool, DomainError> {
        Ok(true)
    }
}

// ============================================================================
// RecordingRollbackNotifier
// ============================================================================

/// A recorded safety violation
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyViolation {
    pub test_id: String,
    pub variant: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

/// Notifier that records violations for later inspection
#[derive(Debug, Default)]
pub struct RecordingRollbackNotifier {
    violations: RwLock<Vec<SafetyViolation>>,
}

impl RecordingRollbackNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn violations(&self) -> Vec<SafetyViolation> {
        self.violations.read().await.clone()
    }
}

#[async_trait]
impl RollbackNotifier for RecordingRollbackNotifier {
    async fn on_safety_violation(
        &self,
        test_id: &str,
        variant: &str,
        metric: &str,
        value: f64,
        threshold: f64,
    ) {
        self.violations.write().await.push(SafetyViolation {
            test_id: test_id.to_string(),
            variant: variant.to_string(),
            metric: metric.to_string(),
            value,
            threshold,
        });
    }
}

/// Notifier that only logs; the default when no rollback executor is wired in
#[derive(Debug, Default)]
pub struct LoggingRollbackNotifier;

#[async_trait]
impl RollbackNotifier for LoggingRollbackNotifier {
    async fn on_safety_violation(
        &self,
        test_id: &str,
        variant: &str,
        metric: &str,
        value: f64,
        threshold: f64,
    ) {
        warn!(
            test_id,
            variant, metric, value, threshold, "safety violation signalled, no rollback executor configured"
        );
    }
}
