//! Experiment domain module
//!
//! Types and traits for the experiment traffic-routing and
//! statistical-decision control plane: immutable configuration, the
//! lifecycle state machine, metric observations, and analysis results.

mod analysis;
mod config;
mod entity;
mod observation;
mod repository;
mod state;

pub use analysis::{Analysis, VariantComparison};
pub use config::{
    ExperimentConfig, ExperimentConfigBuilder, TrafficAllocation, TrafficSplitStrategy,
    TreatmentRef, VariantRef, ALLOCATION_SUM_TOLERANCE, CONFIDENCE_RANGE, CONTROL_VARIANT,
    MIN_SAMPLE_SIZE,
};
pub use entity::Experiment;
pub use observation::MetricObservation;
pub use repository::{ExperimentStore, ObservationQuery, RollbackNotifier, VariantCatalog};
pub use state::ExperimentState;
