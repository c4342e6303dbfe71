//! Experiment lifecycle service
//!
//! Owns the state machine around experiments: creation with conflict
//! detection, start/pause/resume/stop transitions, and the per-experiment
//! background monitor that decides when a running experiment is done.
//!
//! Lifecycle transitions for a given experiment are serialized through a
//! per-id mutex; transitions on different experiments never contend. The
//! durable store is always written before the active registry changes, so a
//! crash between the two leaves the store authoritative.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::domain::error::DomainError;
use crate::domain::experiment::{
    Analysis, Experiment, ExperimentConfig, ExperimentState, ExperimentStore, VariantCatalog,
    CONTROL_VARIANT,
};
use crate::infrastructure::experiment::analyzer::AnalysisEngine;
use crate::infrastructure::experiment::registry::{ActiveExperiment, ActiveRegistry};

/// Why a running experiment is not yet eligible for automatic completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCheck {
    /// Minimum duration has not elapsed
    TooEarly,
    /// Fewer primary-metric observations than the configured minimum
    InsufficientSamples,
    /// Enough data, but no significant difference yet
    NotSignificant,
    /// All completion criteria are satisfied
    Ready,
}

/// Evaluate the completion criteria in their fixed order
///
/// Duration is checked before sample size, and sample size before
/// significance, so the reported blocker is always the earliest unmet
/// criterion.
pub fn completion_check(
    config: &ExperimentConfig,
    elapsed_hours: f64,
    analysis: Option<&Analysis>,
) -> CompletionCheck {
    if elapsed_hours < config.min_duration_hours() {
        return CompletionCheck::TooEarly;
    }

    let sample_size = analysis.map(|a| a.current_sample_size).unwrap_or(0);
    if sample_size < config.minimum_sample_size() {
        return CompletionCheck::InsufficientSamples;
    }

    match analysis {
        Some(a) if a.is_significant => CompletionCheck::Ready,
        _ => CompletionCheck::NotSignificant,
    }
}

/// Coordinates experiment lifecycle transitions and completion monitoring
#[derive(Debug)]
pub struct LifecycleService {
    store: Arc<dyn ExperimentStore>,
    catalog: Arc<dyn VariantCatalog>,
    registry: Arc<ActiveRegistry>,
    analyzer: AnalysisEngine,
    monitor: MonitorConfig,
    /// Per-experiment transition locks
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Join handles of spawned monitor tasks
    monitors: DashMap<String, JoinHandle<()>>,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        catalog: Arc<dyn VariantCatalog>,
        registry: Arc<ActiveRegistry>,
        monitor: MonitorConfig,
    ) -> Self {
        Self {
            analyzer: AnalysisEngine::new(store.clone()),
            store,
            catalog,
            registry,
            monitor,
            locks: DashMap::new(),
            monitors: DashMap::new(),
        }
    }

    pub fn registry(&self) -> Arc<ActiveRegistry> {
        self.registry.clone()
    }

    /// Create an experiment in Planning state
    ///
    /// Rejects unknown variant references, duplicate ids, and experiments
    /// whose variants overlap with an already running experiment.
    pub async fn create(
        &self,
        config: ExperimentConfig,
        created_by: &str,
    ) -> Result<Experiment, DomainError> {
        for variant in config.variant_refs() {
            if !self
                .catalog
                .exists(&variant.model_id, &variant.version)
                .await?
            {
                return Err(DomainError::not_found(format!(
                    "Model variant '{variant}' is not deployable"
                )));
            }
        }

        if self.store.exists(config.test_id()).await? {
            return Err(DomainError::conflict(format!(
                "Experiment '{}' already exists",
                config.test_id()
            )));
        }

        self.check_variant_overlap(&config).await?;

        let experiment = Experiment::new(config, created_by);
        info!(test_id = experiment.test_id(), created_by, "experiment created");
        self.store.put_experiment(experiment.clone()).await?;

        Ok(experiment)
    }

    /// Reject a new experiment whose variants are already under test
    async fn check_variant_overlap(&self, config: &ExperimentConfig) -> Result<(), DomainError> {
        let new_variants: HashSet<(String, String)> = config
            .variant_refs()
            .iter()
            .map(|v| (v.model_id.clone(), v.version.clone()))
            .collect();

        let running = self
            .store
            .list_experiments(Some(ExperimentState::Running))
            .await?;

        for other in running {
            for variant in other.config().variant_refs() {
                let key = (variant.model_id.clone(), variant.version.clone());
                if new_variants.contains(&key) {
                    return Err(DomainError::conflict(format!(
                        "Variant '{variant}' is already part of running experiment '{}'",
                        other.test_id()
                    )));
                }
            }
        }

        Ok(())
    }

    pub async fn get(&self, test_id: &str) -> Result<Experiment, DomainError> {
        self.store
            .get_experiment(test_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Experiment '{test_id}' not found")))
    }

    pub async fn list(
        &self,
        state: Option<ExperimentState>,
    ) -> Result<Vec<Experiment>, DomainError> {
        self.store.list_experiments(state).await
    }

    /// Analyze an experiment and persist the result
    pub async fn analyze(&self, test_id: &str) -> Result<Option<Analysis>, DomainError> {
        let analysis = self.analyzer.analyze(test_id).await?;
        if let Some(ref analysis) = analysis {
            self.store.put_analysis(analysis.clone()).await?;
        }
        Ok(analysis)
    }

    /// Start a planned experiment and spawn its completion monitor
    pub async fn start(self: &Arc<Self>, test_id: &str) -> Result<(), DomainError> {
        let lock = self.transition_lock(test_id);
        let _guard = lock.lock().await;

        let mut experiment = self.get(test_id).await?;
        experiment.start()?;
        self.store.put_experiment(experiment.clone()).await?;

        let started_at = experiment.started_at().unwrap_or_else(Utc::now);
        let active = self
            .registry
            .register(experiment.config().clone(), started_at);
        self.spawn_monitor(test_id, active);

        info!(test_id, "experiment started");
        Ok(())
    }

    /// Pause a running experiment
    ///
    /// Routing falls back to control and the monitor exits; elapsed time
    /// keeps counting from the original start.
    pub async fn pause(&self, test_id: &str) -> Result<(), DomainError> {
        let lock = self.transition_lock(test_id);
        let _guard = lock.lock().await;

        let mut experiment = self.get(test_id).await?;
        experiment.pause()?;
        self.store.put_experiment(experiment).await?;
        self.registry.deregister(test_id);

        info!(test_id, "experiment paused");
        Ok(())
    }

    /// Resume a paused experiment, restarting its monitor
    pub async fn resume(self: &Arc<Self>, test_id: &str) -> Result<(), DomainError> {
        let lock = self.transition_lock(test_id);
        let _guard = lock.lock().await;

        let mut experiment = self.get(test_id).await?;
        experiment.resume()?;
        self.store.put_experiment(experiment.clone()).await?;

        // Elapsed time is measured from the original start, not the resume
        let started_at = experiment.started_at().unwrap_or_else(Utc::now);
        let active = self
            .registry
            .register(experiment.config().clone(), started_at);
        self.spawn_monitor(test_id, active);

        info!(test_id, "experiment resumed");
        Ok(())
    }

    /// Stop an experiment
    ///
    /// A running experiment always completes with the best current
    /// recommendation; the completion-criteria gate belongs to the monitor,
    /// not to a manual stop. Without `force`, anything not Running returns
    /// `false`. With `force`, a paused experiment also completes and a
    /// planned one is cancelled. Missing and terminal experiments return
    /// `false`, so repeated stops are harmless.
    pub async fn stop(
        &self,
        test_id: &str,
        reason: Option<&str>,
        force: bool,
    ) -> Result<bool, DomainError> {
        let lock = self.transition_lock(test_id);
        let _guard = lock.lock().await;

        let Some(experiment) = self.store.get_experiment(test_id).await? else {
            return Ok(false);
        };

        match experiment.state() {
            state if state.is_terminal() => Ok(false),
            ExperimentState::Running => {
                let analysis = self.analyzer.analyze(test_id).await?;
                self.finish(experiment, analysis, reason.unwrap_or("stopped manually"))
                    .await?;
                Ok(true)
            }
            _ if !force => Ok(false),
            ExperimentState::Planning => {
                let mut experiment = experiment;
                experiment.cancel(reason.unwrap_or("stopped before start"))?;
                self.store.put_experiment(experiment).await?;
                self.locks.remove(test_id);
                info!(test_id, "planned experiment cancelled");
                Ok(true)
            }
            _ => {
                let analysis = self.analyzer.analyze(test_id).await?;
                self.finish(experiment, analysis, reason.unwrap_or("stopped manually"))
                    .await?;
                Ok(true)
            }
        }
    }

    /// Gracefully stop all monitors without touching experiment state
    pub async fn shutdown(&self) {
        for test_id in self.registry.active_ids() {
            self.registry.deregister(&test_id);
        }

        let handles: Vec<(String, JoinHandle<()>)> = {
            let keys: Vec<String> = self.monitors.iter().map(|e| e.key().clone()).collect();
            keys.into_iter()
                .filter_map(|k| self.monitors.remove(&k))
                .collect()
        };
        for (test_id, handle) in handles {
            if handle.await.is_err() {
                warn!(test_id, "monitor task panicked");
            }
        }
    }

    fn transition_lock(&self, test_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(test_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Complete a running or paused experiment with the analysis verdict
    ///
    /// Caller must hold the transition lock.
    async fn finish(
        &self,
        mut experiment: Experiment,
        analysis: Option<Analysis>,
        reason: &str,
    ) -> Result<(), DomainError> {
        let winner = analysis
            .as_ref()
            .map(|a| a.recommendation.clone())
            .unwrap_or_else(|| CONTROL_VARIANT.to_string());

        experiment.complete(winner.clone(), reason)?;
        self.store.put_experiment(experiment.clone()).await?;
        if let Some(analysis) = analysis {
            self.store.put_analysis(analysis).await?;
        }
        self.registry.deregister(experiment.test_id());

        // Terminal experiments transition no further; release the per-id
        // bookkeeping. The monitor exits on its own once deregistered.
        self.locks.remove(experiment.test_id());
        self.monitors.remove(experiment.test_id());

        info!(
            test_id = experiment.test_id(),
            winner, reason, "experiment completed"
        );
        Ok(())
    }

    /// Spawn the background completion monitor for an active experiment
    fn spawn_monitor(self: &Arc<Self>, test_id: &str, active: Arc<ActiveExperiment>) {
        let service = self.clone();
        let test_id = test_id.to_string();

        let handle = tokio::spawn({
            let test_id = test_id.clone();
            async move { service.monitor_loop(&test_id, active).await }
        });
        // A replaced handle belongs to a previous run that has observed its
        // deregistration; reap it instead of leaving it detached
        if let Some(old) = self.monitors.insert(test_id, handle) {
            old.abort();
        }
    }

    /// Evaluates immediately on spawn, then on every interval. The sleep
    /// races against the registry's `Notify`, whose stored permit covers a
    /// deregistration arriving while a check is in flight.
    async fn monitor_loop(self: Arc<Self>, test_id: &str, active: Arc<ActiveExperiment>) {
        debug!(test_id, "monitor started");

        loop {
            if !self.registry.contains(test_id) {
                break;
            }

            let interval = match self.monitor_tick(test_id, &active).await {
                Ok(true) => break,
                Ok(false) => Duration::from_secs(self.monitor.check_interval_secs),
                Err(error) => {
                    warn!(test_id, %error, "monitor check failed, will retry");
                    Duration::from_secs(self.monitor.retry_interval_secs)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = active.stopped.notified() => {
                    debug!(test_id, "monitor woken by deregistration");
                    break;
                }
            }
        }

        debug!(test_id, "monitor exited");
    }

    /// One monitor iteration; returns true when the experiment reached a
    /// terminal state
    async fn monitor_tick(
        &self,
        test_id: &str,
        active: &ActiveExperiment,
    ) -> Result<bool, DomainError> {
        let lock = self.transition_lock(test_id);
        let _guard = lock.lock().await;

        // Re-check under the lock; a pause or stop may have won the race
        if !self.registry.contains(test_id) {
            return Ok(true);
        }

        let experiment = self.get(test_id).await?;
        if experiment.state() != ExperimentState::Running {
            return Ok(true);
        }

        let elapsed = active.elapsed_hours(Utc::now());
        let config = experiment.config();

        if elapsed >= config.max_duration_hours() {
            let analysis = self.analyzer.analyze(test_id).await?;
            self.finish(experiment, analysis, "maximum duration reached")
                .await?;
            return Ok(true);
        }

        if !config.auto_decision_enabled() {
            return Ok(false);
        }

        let analysis = self.analyzer.analyze(test_id).await?;
        match completion_check(config, elapsed, analysis.as_ref()) {
            CompletionCheck::Ready => {
                self.finish(experiment, analysis, "completion criteria met")
                    .await?;
                Ok(true)
            }
            check => {
                debug!(test_id, ?check, elapsed, "experiment not yet complete");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{MetricObservation, VariantRef};
    use crate::infrastructure::experiment::in_memory::{
        InMemoryExperimentStore, PermissiveVariantCatalog, StaticVariantCatalog,
    };

    fn config_with(id: &str, version: &str) -> ExperimentConfig {
        ExperimentConfig::builder(id, "Lifecycle Test")
            .control(VariantRef::new("model-a", "1.0.0"))
            .treatment("treatment", VariantRef::new("model-a", version))
            .allocate("control", 0.5)
            .allocate("treatment", 0.5)
            .duration_hours(0.0, 168.0)
            .minimum_sample_size(100)
            .confidence_level(0.95)
            .minimum_effect_size(0.05)
            .build()
            .unwrap()
    }

    fn service() -> (Arc<LifecycleService>, Arc<InMemoryExperimentStore>) {
        let store = Arc::new(InMemoryExperimentStore::new());
        let registry = Arc::new(ActiveRegistry::new());
        let service = Arc::new(LifecycleService::new(
            store.clone(),
            Arc::new(PermissiveVariantCatalog),
            registry,
            MonitorConfig::default(),
        ));
        (service, store)
    }

    async fn feed_observations(
        store: &InMemoryExperimentStore,
        test_id: &str,
        control_mean: f64,
        treatment_mean: f64,
        n: usize,
    ) {
        for i in 0..n {
            let jitter = ((i % 7) as f64 - 3.0) * 0.004;
            store
                .append_observation(MetricObservation::new(
                    test_id,
                    "control",
                    "accuracy",
                    control_mean + jitter,
                ))
                .await
                .unwrap();
            store
                .append_observation(MetricObservation::new(
                    test_id,
                    "treatment",
                    "accuracy",
                    treatment_mean + jitter,
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_variant() {
        let store = Arc::new(InMemoryExperimentStore::new());
        let catalog = Arc::new(StaticVariantCatalog::new().with_variant("model-a", "1.0.0"));
        let service = LifecycleService::new(
            store,
            catalog,
            Arc::new(ActiveRegistry::new()),
            MonitorConfig::default(),
        );

        let err = service
            .create(config_with("exp-1", "9.9.9"), "tester")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();

        let err = service
            .create(config_with("exp-1", "3.0.0"), "tester")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_create_rejects_variant_overlap_with_running() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();

        // Shares the control variant with the running experiment
        let err = service
            .create(config_with("exp-2", "3.0.0"), "tester")
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_planned_experiments_may_share_variants() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service
            .create(config_with("exp-2", "2.0.0"), "tester")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_registers_and_pause_deregisters() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();

        service.start("exp-1").await.unwrap();
        assert!(service.registry().contains("exp-1"));
        assert_eq!(
            service.get("exp-1").await.unwrap().state(),
            ExperimentState::Running
        );

        service.pause("exp-1").await.unwrap();
        assert!(!service.registry().contains("exp-1"));
        assert_eq!(
            service.get("exp-1").await.unwrap().state(),
            ExperimentState::Paused
        );

        service.resume("exp-1").await.unwrap();
        assert!(service.registry().contains("exp-1"));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_requires_planning_state() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();

        assert!(service.start("exp-1").await.unwrap_err().is_invalid_state());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_forced_stop_from_planning_cancels() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();

        assert!(!service.stop("exp-1", None, false).await.unwrap());
        assert!(service.stop("exp-1", None, true).await.unwrap());

        let experiment = service.get("exp-1").await.unwrap();
        assert_eq!(experiment.state(), ExperimentState::Cancelled);
        assert_eq!(experiment.stop_reason(), Some("stopped before start"));
    }

    #[tokio::test]
    async fn test_forced_stop_completes_with_recommendation() {
        let (service, store) = service();
        // Non-zero minimum duration keeps the background monitor from
        // completing the experiment before the manual stop under test.
        let config = ExperimentConfig::builder("exp-1", "Lifecycle Test")
            .control(VariantRef::new("model-a", "1.0.0"))
            .treatment("treatment", VariantRef::new("model-a", "2.0.0"))
            .allocate("control", 0.5)
            .allocate("treatment", 0.5)
            .duration_hours(1.0, 168.0)
            .minimum_sample_size(100)
            .confidence_level(0.95)
            .minimum_effect_size(0.05)
            .build()
            .unwrap();
        service.create(config, "tester").await.unwrap();
        service.start("exp-1").await.unwrap();
        feed_observations(&store, "exp-1", 0.80, 0.90, 100).await;

        assert!(service.stop("exp-1", None, true).await.unwrap());

        let experiment = service.get("exp-1").await.unwrap();
        assert_eq!(experiment.state(), ExperimentState::Completed);
        assert_eq!(experiment.winner(), Some("treatment"));
        assert!(!service.registry().contains("exp-1"));

        // Analysis snapshot persisted alongside the terminal state
        assert!(store.get_analysis("exp-1").await.unwrap().is_some());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_forced_stop_without_data_picks_control() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();

        assert!(service.stop("exp-1", None, true).await.unwrap());
        assert_eq!(service.get("exp-1").await.unwrap().winner(), Some("control"));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_on_terminal() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();
        assert!(service.stop("exp-1", None, true).await.unwrap());

        assert!(!service.stop("exp-1", None, false).await.unwrap());
        assert!(!service.stop("exp-1", None, true).await.unwrap());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_unforced_stop_completes_running_unconditionally() {
        let (service, store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();

        // Far below the sample minimum; a manual stop finalizes anyway
        feed_observations(&store, "exp-1", 0.80, 0.90, 5).await;
        assert!(service
            .stop("exp-1", Some("business decision"), false)
            .await
            .unwrap());

        let experiment = service.get("exp-1").await.unwrap();
        assert_eq!(experiment.state(), ExperimentState::Completed);
        assert_eq!(experiment.stop_reason(), Some("business decision"));
        assert!(experiment.winner().is_some());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_unforced_stop_does_not_touch_paused() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();
        service.pause("exp-1").await.unwrap();

        assert!(!service.stop("exp-1", None, false).await.unwrap());
        assert_eq!(
            service.get("exp-1").await.unwrap().state(),
            ExperimentState::Paused
        );

        // Forced stop still completes a paused experiment
        assert!(service.stop("exp-1", None, true).await.unwrap());
        assert_eq!(
            service.get("exp-1").await.unwrap().state(),
            ExperimentState::Completed
        );

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_releases_per_experiment_bookkeeping() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();
        assert_eq!(service.monitors.len(), 1);

        assert!(service.stop("exp-1", None, true).await.unwrap());

        assert!(service.locks.is_empty());
        assert!(service.monitors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_evaluates_immediately_on_start() {
        let (service, store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        // Criteria already satisfied before the experiment starts
        feed_observations(&store, "exp-1", 0.80, 0.90, 100).await;
        service.start("exp-1").await.unwrap();

        // Time never advances here; only the scheduler runs. The first
        // check must not be delayed by a full interval.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        let experiment = service.get("exp-1").await.unwrap();
        assert_eq!(experiment.state(), ExperimentState::Completed);
        assert_eq!(experiment.winner(), Some("treatment"));

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_completes_significant_experiment() {
        let (service, store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();
        feed_observations(&store, "exp-1", 0.80, 0.90, 100).await;

        // Paused time auto-advances past the first check interval
        tokio::time::sleep(Duration::from_secs(
            MonitorConfig::default().check_interval_secs + 1,
        ))
        .await;
        service.shutdown().await;

        let experiment = service.get("exp-1").await.unwrap();
        assert_eq!(experiment.state(), ExperimentState::Completed);
        assert_eq!(experiment.winner(), Some("treatment"));
        assert_eq!(experiment.stop_reason(), Some("completion criteria met"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_leaves_inconclusive_experiment_running() {
        let (service, store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();
        // Indistinguishable variants
        feed_observations(&store, "exp-1", 0.80, 0.80, 100).await;

        tokio::time::sleep(Duration::from_secs(
            MonitorConfig::default().check_interval_secs + 1,
        ))
        .await;

        assert_eq!(
            service.get("exp-1").await.unwrap().state(),
            ExperimentState::Running
        );

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_wakes_monitor_promptly() {
        let (service, _store) = service();
        service
            .create(config_with("exp-1", "2.0.0"), "tester")
            .await
            .unwrap();
        service.start("exp-1").await.unwrap();

        // Joins the monitor without waiting out the check interval
        service.shutdown().await;

        // The experiment itself stays running; shutdown is not a stop
        assert_eq!(
            service.get("exp-1").await.unwrap().state(),
            ExperimentState::Running
        );
    }

    #[test]
    fn test_completion_check_ordering() {
        let config = ExperimentConfig::builder("check-exp", "Check")
            .control(VariantRef::new("model-a", "1.0.0"))
            .treatment("treatment", VariantRef::new("model-a", "2.0.0"))
            .allocate("control", 0.5)
            .allocate("treatment", 0.5)
            .duration_hours(24.0, 168.0)
            .minimum_sample_size(100)
            .build()
            .unwrap();

        let analysis = |samples: u64, significant: bool| Analysis {
            test_id: "check-exp".to_string(),
            is_significant: significant,
            p_value: if significant { 0.01 } else { 0.4 },
            comparisons: vec![],
            statistical_power: 0.5,
            required_sample_size: 320,
            current_sample_size: samples,
            recommendation: "control".to_string(),
            confidence_score: 0.6,
            decision_factors: vec![],
            computed_at: Utc::now(),
        };

        // Duration blocks first, regardless of the rest
        assert_eq!(
            completion_check(&config, 1.0, Some(&analysis(1000, true))),
            CompletionCheck::TooEarly
        );

        // Then sample size
        assert_eq!(
            completion_check(&config, 48.0, Some(&analysis(50, true))),
            CompletionCheck::InsufficientSamples
        );
        assert_eq!(
            completion_check(&config, 48.0, None),
            CompletionCheck::InsufficientSamples
        );

        // Then significance
        assert_eq!(
            completion_check(&config, 48.0, Some(&analysis(1000, false))),
            CompletionCheck::NotSignificant
        );

        assert_eq!(
            completion_check(&config, 48.0, Some(&analysis(1000, true))),
            CompletionCheck::Ready
        );
    }
}
