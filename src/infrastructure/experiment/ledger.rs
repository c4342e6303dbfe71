//! Metrics ledger and safety monitor
//!
//! Every recorded observation is appended to the store and then checked
//! against the experiment's performance thresholds in the same call, so a
//! breach is signalled on the first offending observation rather than on the
//! next monitor tick.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::error::DomainError;
use crate::domain::experiment::{
    ExperimentConfig, ExperimentStore, MetricObservation, ObservationQuery, RollbackNotifier,
};

use super::registry::ActiveRegistry;

/// Append-only metric recording with synchronous threshold checks
#[derive(Debug, Clone)]
pub struct MetricsLedger {
    store: Arc<dyn ExperimentStore>,
    registry: Arc<ActiveRegistry>,
    notifier: Arc<dyn RollbackNotifier>,
}

impl MetricsLedger {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        registry: Arc<ActiveRegistry>,
        notifier: Arc<dyn RollbackNotifier>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Record an observation and run the safety check
    ///
    /// The append happens first; a safety violation never loses the
    /// observation that triggered it.
    pub async fn record(&self, observation: MetricObservation) -> Result<(), DomainError> {
        debug!(
            test_id = %observation.test_id,
            variant = %observation.variant,
            metric = %observation.metric,
            value = observation.value,
            "recording observation"
        );

        self.store.append_observation(observation.clone()).await?;
        self.check_safety(&observation).await?;

        Ok(())
    }

    /// Observations for an experiment and metric, grouped by variant
    pub async fn query_by_variant(
        &self,
        test_id: &str,
        metric: &str,
    ) -> Result<HashMap<String, Vec<MetricObservation>>, DomainError> {
        self.query_by_variant_in_range(test_id, metric, None, None)
            .await
    }

    /// Like [`query_by_variant`](Self::query_by_variant), restricted to an
    /// inclusive time window
    pub async fn query_by_variant_in_range(
        &self,
        test_id: &str,
        metric: &str,
        start: Option<chrono::DateTime<chrono::Utc>>,
        end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<HashMap<String, Vec<MetricObservation>>, DomainError> {
        let query = ObservationQuery::new(test_id)
            .with_metric(metric)
            .with_time_range(start, end);
        let observations = self.store.query_observations(&query).await?;

        let mut grouped: HashMap<String, Vec<MetricObservation>> = HashMap::new();
        for observation in observations {
            grouped
                .entry(observation.variant.clone())
                .or_default()
                .push(observation);
        }

        Ok(grouped)
    }

    /// Compare the observation against the configured performance floor
    async fn check_safety(&self, observation: &MetricObservation) -> Result<(), DomainError> {
        let Some(config) = self.config_for(&observation.test_id).await? else {
            return Ok(());
        };

        if !config.auto_rollback_enabled() {
            return Ok(());
        }

        let Some(threshold) = config.threshold_for(&observation.metric) else {
            return Ok(());
        };

        if observation.value < threshold {
            warn!(
                test_id = %observation.test_id,
                variant = %observation.variant,
                metric = %observation.metric,
                value = observation.value,
                threshold,
                "safety threshold violated"
            );

            self.notifier
                .on_safety_violation(
                    &observation.test_id,
                    &observation.variant,
                    &observation.metric,
                    observation.value,
                    threshold,
                )
                .await;
        }

        Ok(())
    }

    /// Configuration lookup, preferring the active registry snapshot
    async fn config_for(&self, test_id: &str) -> Result<Option<ExperimentConfig>, DomainError> {
        if let Some(active) = self.registry.get(test_id) {
            return Ok(Some(active.config.clone()));
        }

        Ok(self
            .store
            .get_experiment(test_id)
            .await?
            .map(|experiment| experiment.config().clone()))
    }
}
