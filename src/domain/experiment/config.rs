//! Experiment configuration types
//!
//! An [`ExperimentConfig`] is immutable once built. The builder validates
//! every invariant so a config value is never partially valid.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::domain::error::DomainError;

/// Reserved name of the control variant
pub const CONTROL_VARIANT: &str = "control";

/// Tolerance for the traffic allocation sum around 1.0
pub const ALLOCATION_SUM_TOLERANCE: f64 = 0.01;

/// Minimum allowed sample size for any experiment
pub const MIN_SAMPLE_SIZE: u64 = 100;

/// Allowed confidence level range
pub const CONFIDENCE_RANGE: (f64, f64) = (0.80, 0.99);

// ============================================================================
// VariantRef
// ============================================================================

/// A deployable (model, version) pair competing in an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantRef {
    pub model_id: String,
    pub version: String,
}

impl VariantRef {
    pub fn new(model_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VariantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model_id, self.version)
    }
}

/// A named treatment variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRef {
    pub name: String,
    pub variant: VariantRef,
}

impl TreatmentRef {
    pub fn new(name: impl Into<String>, variant: VariantRef) -> Self {
        Self {
            name: name.into(),
            variant,
        }
    }
}

// ============================================================================
// TrafficAllocation
// ============================================================================

/// Traffic share for a named variant
///
/// Allocations are kept in configuration order so cumulative-weight walks
/// and the first-configured fallback are well-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficAllocation {
    variant: String,
    fraction: f64,
}

impl TrafficAllocation {
    /// Create a new allocation, clamping the fraction to [0, 1]
    pub fn new(variant: impl Into<String>, fraction: f64) -> Self {
        Self {
            variant: variant.into(),
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

// ============================================================================
// TrafficSplitStrategy
// ============================================================================

/// Strategy used by the router to pick a variant for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficSplitStrategy {
    /// Uniform random draw over the configured allocation
    #[default]
    Random,
    /// Deterministic assignment from a stable hash of the user identifier
    UserHash,
    /// Geographic segmentation; falls back to random without a geo table
    Geographical,
    /// Control-only unless a feature flag override selects otherwise
    FeatureFlag,
    /// Linear ramp from all-control to the configured split
    GradualRollout,
}

impl fmt::Display for TrafficSplitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::UserHash => write!(f, "user-hash"),
            Self::Geographical => write!(f, "geographical"),
            Self::FeatureFlag => write!(f, "feature-flag"),
            Self::GradualRollout => write!(f, "gradual-rollout"),
        }
    }
}

// ============================================================================
// ExperimentConfig
// ============================================================================

/// Full configuration of a model variant experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    test_id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    control: VariantRef,
    treatments: Vec<TreatmentRef>,
    traffic_allocation: Vec<TrafficAllocation>,
    traffic_split_strategy: TrafficSplitStrategy,
    min_duration_hours: f64,
    max_duration_hours: f64,
    minimum_sample_size: u64,
    confidence_level: f64,
    minimum_effect_size: f64,
    primary_metric: String,
    secondary_metrics: Vec<String>,
    business_metrics: Vec<String>,
    performance_thresholds: HashMap<String, f64>,
    auto_rollback_enabled: bool,
    decision_criteria: Vec<String>,
    auto_decision_enabled: bool,
}

impl ExperimentConfig {
    /// Start building a configuration
    pub fn builder(test_id: impl Into<String>, name: impl Into<String>) -> ExperimentConfigBuilder {
        ExperimentConfigBuilder::new(test_id, name)
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn control(&self) -> &VariantRef {
        &self.control
    }

    pub fn treatments(&self) -> &[TreatmentRef] {
        &self.treatments
    }

    /// All variant refs: control first, then treatments in order
    pub fn variant_refs(&self) -> Vec<&VariantRef> {
        std::iter::once(&self.control)
            .chain(self.treatments.iter().map(|t| &t.variant))
            .collect()
    }

    /// (model, version) pair for a variant name, if the name is known
    pub fn variant_ref_for(&self, name: &str) -> Option<&VariantRef> {
        if name == CONTROL_VARIANT {
            return Some(&self.control);
        }
        self.treatments
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.variant)
    }

    pub fn traffic_allocation(&self) -> &[TrafficAllocation] {
        &self.traffic_allocation
    }

    pub fn traffic_split_strategy(&self) -> TrafficSplitStrategy {
        self.traffic_split_strategy
    }

    pub fn min_duration_hours(&self) -> f64 {
        self.min_duration_hours
    }

    pub fn max_duration_hours(&self) -> f64 {
        self.max_duration_hours
    }

    pub fn minimum_sample_size(&self) -> u64 {
        self.minimum_sample_size
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    pub fn minimum_effect_size(&self) -> f64 {
        self.minimum_effect_size
    }

    pub fn primary_metric(&self) -> &str {
        &self.primary_metric
    }

    pub fn secondary_metrics(&self) -> &[String] {
        &self.secondary_metrics
    }

    pub fn business_metrics(&self) -> &[String] {
        &self.business_metrics
    }

    pub fn performance_thresholds(&self) -> &HashMap<String, f64> {
        &self.performance_thresholds
    }

    /// Floor threshold for a metric, if one is configured
    pub fn threshold_for(&self, metric: &str) -> Option<f64> {
        self.performance_thresholds.get(metric).copied()
    }

    pub fn auto_rollback_enabled(&self) -> bool {
        self.auto_rollback_enabled
    }

    pub fn decision_criteria(&self) -> &[String] {
        &self.decision_criteria
    }

    pub fn auto_decision_enabled(&self) -> bool {
        self.auto_decision_enabled
    }

    /// Names of all variants in configuration order: "control" then treatments
    ///
    /// Treatment names follow the allocation entries; any allocated name other
    /// than "control" is a treatment name.
    pub fn variant_names(&self) -> Vec<&str> {
        self.traffic_allocation
            .iter()
            .map(TrafficAllocation::variant)
            .collect()
    }
}

// ============================================================================
// ExperimentConfigBuilder
// ============================================================================

/// Builder for [`ExperimentConfig`]; `build` validates all invariants
#[derive(Debug, Clone)]
pub struct ExperimentConfigBuilder {
    test_id: String,
    name: String,
    description: Option<String>,
    control: Option<VariantRef>,
    treatments: Vec<TreatmentRef>,
    traffic_allocation: Vec<TrafficAllocation>,
    traffic_split_strategy: TrafficSplitStrategy,
    min_duration_hours: f64,
    max_duration_hours: f64,
    minimum_sample_size: u64,
    confidence_level: f64,
    minimum_effect_size: f64,
    primary_metric: String,
    secondary_metrics: Vec<String>,
    business_metrics: Vec<String>,
    performance_thresholds: HashMap<String, f64>,
    auto_rollback_enabled: bool,
    decision_criteria: Vec<String>,
    auto_decision_enabled: bool,
}

impl ExperimentConfigBuilder {
    fn new(test_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            name: name.into(),
            description: None,
            control: None,
            treatments: Vec::new(),
            traffic_allocation: Vec::new(),
            traffic_split_strategy: TrafficSplitStrategy::Random,
            min_duration_hours: 24.0,
            max_duration_hours: 168.0,
            minimum_sample_size: 1000,
            confidence_level: 0.95,
            minimum_effect_size: 0.05,
            primary_metric: "accuracy".to_string(),
            secondary_metrics: Vec::new(),
            business_metrics: Vec::new(),
            performance_thresholds: HashMap::new(),
            auto_rollback_enabled: true,
            decision_criteria: Vec::new(),
            auto_decision_enabled: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the control variant (always named "control" in allocations)
    pub fn control(mut self, variant: VariantRef) -> Self {
        self.control = Some(variant);
        self
    }

    /// Add a named treatment variant
    pub fn treatment(mut self, name: impl Into<String>, variant: VariantRef) -> Self {
        self.treatments.push(TreatmentRef::new(name, variant));
        self
    }

    /// Add a traffic allocation entry (order is preserved)
    pub fn allocate(mut self, variant: impl Into<String>, fraction: f64) -> Self {
        self.traffic_allocation
            .push(TrafficAllocation::new(variant, fraction));
        self
    }

    pub fn strategy(mut self, strategy: TrafficSplitStrategy) -> Self {
        self.traffic_split_strategy = strategy;
        self
    }

    pub fn duration_hours(mut self, min: f64, max: f64) -> Self {
        self.min_duration_hours = min;
        self.max_duration_hours = max;
        self
    }

    pub fn minimum_sample_size(mut self, size: u64) -> Self {
        self.minimum_sample_size = size;
        self
    }

    pub fn confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn minimum_effect_size(mut self, size: f64) -> Self {
        self.minimum_effect_size = size;
        self
    }

    pub fn primary_metric(mut self, metric: impl Into<String>) -> Self {
        self.primary_metric = metric.into();
        self
    }

    pub fn secondary_metric(mut self, metric: impl Into<String>) -> Self {
        self.secondary_metrics.push(metric.into());
        self
    }

    pub fn business_metric(mut self, metric: impl Into<String>) -> Self {
        self.business_metrics.push(metric.into());
        self
    }

    pub fn performance_threshold(mut self, metric: impl Into<String>, floor: f64) -> Self {
        self.performance_thresholds.insert(metric.into(), floor);
        self
    }

    pub fn auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback_enabled = enabled;
        self
    }

    pub fn decision_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.decision_criteria.push(criterion.into());
        self
    }

    pub fn auto_decision(mut self, enabled: bool) -> Self {
        self.auto_decision_enabled = enabled;
        self
    }

    /// Validate all invariants and produce the config
    pub fn build(self) -> Result<ExperimentConfig, DomainError> {
        if self.test_id.is_empty() {
            return Err(DomainError::validation("Experiment ID cannot be empty"));
        }

        let control = self
            .control
            .ok_or_else(|| DomainError::validation("Experiment must have a control variant"))?;

        if self.treatments.is_empty() {
            return Err(DomainError::validation(
                "Experiment must have at least one treatment variant",
            ));
        }

        let mut seen_names = HashSet::new();
        seen_names.insert(CONTROL_VARIANT);

        for TreatmentRef { name, .. } in &self.treatments {
            if name == CONTROL_VARIANT {
                return Err(DomainError::validation(
                    "Treatment variant cannot be named 'control'",
                ));
            }
            if !seen_names.insert(name.as_str()) {
                return Err(DomainError::validation(format!(
                    "Duplicate variant name: '{name}'"
                )));
            }
        }

        if self.traffic_allocation.is_empty() {
            return Err(DomainError::validation(
                "Experiment must allocate traffic to its variants",
            ));
        }

        let sum: f64 = self.traffic_allocation.iter().map(|a| a.fraction()).sum();
        if (sum - 1.0).abs() > ALLOCATION_SUM_TOLERANCE {
            return Err(DomainError::validation(format!(
                "Traffic allocations must sum to 1.0 (±{ALLOCATION_SUM_TOLERANCE}), got {sum:.3}"
            )));
        }

        let mut allocated = HashSet::new();
        for allocation in &self.traffic_allocation {
            if !seen_names.contains(allocation.variant()) {
                return Err(DomainError::validation(format!(
                    "Traffic allocated to unknown variant: '{}'",
                    allocation.variant()
                )));
            }
            if !allocated.insert(allocation.variant()) {
                return Err(DomainError::validation(format!(
                    "Duplicate traffic allocation for variant: '{}'",
                    allocation.variant()
                )));
            }
        }

        if self.minimum_sample_size < MIN_SAMPLE_SIZE {
            return Err(DomainError::validation(format!(
                "Minimum sample size must be at least {MIN_SAMPLE_SIZE}, got {}",
                self.minimum_sample_size
            )));
        }

        let (lo, hi) = CONFIDENCE_RANGE;
        if self.confidence_level < lo || self.confidence_level > hi {
            return Err(DomainError::validation(format!(
                "Confidence level must be in [{lo}, {hi}], got {}",
                self.confidence_level
            )));
        }

        if self.min_duration_hours < 0.0
            || self.max_duration_hours <= 0.0
            || self.min_duration_hours > self.max_duration_hours
        {
            return Err(DomainError::validation(format!(
                "Invalid duration bounds: min={} max={}",
                self.min_duration_hours, self.max_duration_hours
            )));
        }

        if self.minimum_effect_size <= 0.0 {
            return Err(DomainError::validation(
                "Minimum effect size must be positive",
            ));
        }

        if self.primary_metric.is_empty() {
            return Err(DomainError::validation("Primary metric cannot be empty"));
        }

        Ok(ExperimentConfig {
            test_id: self.test_id,
            name: self.name,
            description: self.description,
            control,
            treatments: self.treatments,
            traffic_allocation: self.traffic_allocation,
            traffic_split_strategy: self.traffic_split_strategy,
            min_duration_hours: self.min_duration_hours,
            max_duration_hours: self.max_duration_hours,
            minimum_sample_size: self.minimum_sample_size,
            confidence_level: self.confidence_level,
            minimum_effect_size: self.minimum_effect_size,
            primary_metric: self.primary_metric,
            secondary_metrics: self.secondary_metrics,
            business_metrics: self.business_metrics,
            performance_thresholds: self.performance_thresholds,
            auto_rollback_enabled: self.auto_rollback_enabled,
            decision_criteria: self.decision_criteria,
            auto_decision_enabled: self.auto_decision_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_builder() -> ExperimentConfigBuilder {
        ExperimentConfig::builder("test-exp", "Test Experiment")
            .control(VariantRef::new("model-a", "1.0.0"))
            .treatment("treatment", VariantRef::new("model-a", "2.0.0"))
            .allocate("control", 0.5)
            .allocate("treatment", 0.5)
            .minimum_sample_size(100)
    }

    #[test]
    fn test_valid_config() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.test_id(), "test-exp");
        assert_eq!(config.control().version, "1.0.0");
        assert_eq!(config.treatments().len(), 1);
        assert_eq!(config.traffic_allocation().len(), 2);
        assert_eq!(config.variant_names(), vec!["control", "treatment"]);
    }

    #[test]
    fn test_allocation_sum_below_tolerance_fails() {
        let result = ExperimentConfig::builder("t", "T")
            .control(VariantRef::new("m", "1.0.0"))
            .treatment("treatment", VariantRef::new("m", "2.0.0"))
            .allocate("control", 0.5)
            .allocate("treatment", 0.47)
            .minimum_sample_size(100)
            .build();

        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_allocation_sum_above_tolerance_fails() {
        let result = ExperimentConfig::builder("t", "T")
            .control(VariantRef::new("m", "1.0.0"))
            .treatment("treatment", VariantRef::new("m", "2.0.0"))
            .allocate("control", 0.5)
            .allocate("treatment", 0.55)
            .minimum_sample_size(100)
            .build();

        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_allocation_sum_within_tolerance_succeeds() {
        for treatment_share in [0.495, 0.5, 0.505] {
            let result = ExperimentConfig::builder("t", "T")
                .control(VariantRef::new("m", "1.0.0"))
                .treatment("treatment", VariantRef::new("m", "2.0.0"))
                .allocate("control", 0.5)
                .allocate("treatment", treatment_share)
                .minimum_sample_size(100)
                .build();

            assert!(result.is_ok(), "sum 0.5+{treatment_share} should pass");
        }
    }

    #[test]
    fn test_sample_size_floor() {
        let result = base_builder().minimum_sample_size(99).build();
        assert!(result.unwrap_err().is_validation());

        assert!(base_builder().minimum_sample_size(100).build().is_ok());
    }

    #[test]
    fn test_confidence_level_range() {
        assert!(base_builder().confidence_level(0.79).build().is_err());
        assert!(base_builder().confidence_level(0.995).build().is_err());
        assert!(base_builder().confidence_level(0.80).build().is_ok());
        assert!(base_builder().confidence_level(0.99).build().is_ok());
    }

    #[test]
    fn test_allocation_to_unknown_variant_fails() {
        let result = ExperimentConfig::builder("t", "T")
            .control(VariantRef::new("m", "1.0.0"))
            .treatment("treatment", VariantRef::new("m", "2.0.0"))
            .allocate("control", 0.5)
            .allocate("ghost", 0.5)
            .minimum_sample_size(100)
            .build();

        let err = result.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_missing_control_fails() {
        let result = ExperimentConfig::builder("t", "T")
            .treatment("treatment", VariantRef::new("m", "2.0.0"))
            .allocate("treatment", 1.0)
            .build();

        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_treatment_named_control_fails() {
        let result = ExperimentConfig::builder("t", "T")
            .control(VariantRef::new("m", "1.0.0"))
            .treatment("control", VariantRef::new("m", "2.0.0"))
            .allocate("control", 1.0)
            .minimum_sample_size(100)
            .build();

        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_invalid_duration_bounds() {
        let result = base_builder().duration_hours(48.0, 24.0).build();
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = base_builder()
            .strategy(TrafficSplitStrategy::UserHash)
            .performance_threshold("accuracy", 0.7)
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"user-hash\""));

        let parsed: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(TrafficSplitStrategy::Random.to_string(), "random");
        assert_eq!(TrafficSplitStrategy::UserHash.to_string(), "user-hash");
        assert_eq!(
            TrafficSplitStrategy::GradualRollout.to_string(),
            "gradual-rollout"
        );
    }
}
