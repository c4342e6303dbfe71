//! Experiment infrastructure
//!
//! Concrete machinery behind the domain traits: the traffic router, the
//! metrics ledger with its safety monitor, the statistical analysis engine,
//! the active-experiment registry, and in-memory trait implementations.

pub mod analyzer;
pub mod in_memory;
pub mod ledger;
pub mod registry;
pub mod router;
pub mod statistical;

pub use analyzer::AnalysisEngine;
pub use in_memory::{
    InMemoryExperimentStore, LoggingRollbackNotifier, PermissiveVariantCatalog,
    RecordingRollbackNotifier, SafetyViolation, StaticVariantCatalog,
};
pub use ledger::MetricsLedger;
pub use registry::{ActiveExperiment, ActiveRegistry};
pub use router::{FeatureFlagOverride, RequestContext, TrafficRouter};
