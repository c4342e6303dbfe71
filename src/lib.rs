//! Experiment control plane for model variants
//!
//! A/B experiment management for competing model versions: lifecycle
//! transitions, per-request traffic routing, an append-only metrics ledger
//! with safety thresholds, and a Welch t-test analysis engine that drives
//! automatic completion decisions.
//!
//! The crate is storage-agnostic. Callers wire the [`LifecycleService`],
//! [`TrafficRouter`], and [`MetricsLedger`] against implementations of the
//! `domain` traits; in-memory implementations are provided for tests and
//! single-process use.
//!
//! ```no_run
//! use std::sync::Arc;
//! use experiment_control_plane::config::MonitorConfig;
//! use experiment_control_plane::domain::experiment::{ExperimentConfig, VariantRef};
//! use experiment_control_plane::infrastructure::experiment::{
//!     ActiveRegistry, InMemoryExperimentStore, PermissiveVariantCatalog, TrafficRouter,
//!     RequestContext,
//! };
//! use experiment_control_plane::infrastructure::services::LifecycleService;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ActiveRegistry::new());
//! let service = Arc::new(LifecycleService::new(
//!     Arc::new(InMemoryExperimentStore::new()),
//!     Arc::new(PermissiveVariantCatalog),
//!     registry.clone(),
//!     MonitorConfig::default(),
//! ));
//!
//! let config = ExperimentConfig::builder("checkout-v2", "Checkout model v2")
//!     .control(VariantRef::new("checkout", "1.4.0"))
//!     .treatment("treatment", VariantRef::new("checkout", "2.0.0"))
//!     .allocate("control", 0.9)
//!     .allocate("treatment", 0.1)
//!     .build()?;
//!
//! service.create(config, "release-bot").await?;
//! service.start("checkout-v2").await?;
//!
//! let router = TrafficRouter::new(registry);
//! let variant = router.assign("checkout-v2", &RequestContext::new().with_user_id("u-42"));
//! # let _ = variant;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use domain::error::DomainError;
pub use domain::experiment::{
    Analysis, Experiment, ExperimentConfig, ExperimentState, MetricObservation,
};
pub use infrastructure::experiment::{MetricsLedger, TrafficRouter};
pub use infrastructure::services::LifecycleService;
