//! Statistical analysis result types
//!
//! An [`Analysis`] is a derived artifact: it is always recomputed from raw
//! observations and never treated as a source of truth for a running
//! experiment. The persisted copy alongside a terminal state is
//! informational.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comparison of one treatment variant against control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantComparison {
    /// Name of the treatment variant
    pub variant: String,
    /// Relative improvement over control in percent; `None` when the control
    /// mean is zero and the ratio is undefined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_improvement: Option<f64>,
    /// Absolute difference of means (treatment - control)
    pub absolute_difference: f64,
    /// Welch t-test p-value against control
    pub p_value: f64,
    /// Whether p < (1 - confidence_level)
    pub is_significant: bool,
    /// Observation count for this variant's primary metric
    pub sample_size: u64,
}

/// Result of analyzing an experiment's primary metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub test_id: String,
    /// True when any treatment shows a significant difference from control
    pub is_significant: bool,
    /// Minimum p-value across all treatment comparisons
    pub p_value: f64,
    /// Per-treatment comparisons, in configuration order
    pub comparisons: Vec<VariantComparison>,
    /// Observed statistical power (documented approximation, capped at 0.95)
    pub statistical_power: f64,
    /// Required sample size (documented approximation)
    pub required_sample_size: u64,
    /// Current primary-metric observation count across all variants
    pub current_sample_size: u64,
    /// Recommended variant name, or "control"
    pub recommendation: String,
    /// Confidence in the recommendation (heuristic score, not a probability)
    pub confidence_score: f64,
    /// Human-readable factors behind the recommendation
    pub decision_factors: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl Analysis {
    /// Comparison for a specific variant, if present
    pub fn comparison_for(&self, variant: &str) -> Option<&VariantComparison> {
        self.comparisons.iter().find(|c| c.variant == variant)
    }

    /// Whether the recommendation points at a treatment rather than control
    pub fn recommends_treatment(&self) -> bool {
        self.recommendation != "control"
    }
}
