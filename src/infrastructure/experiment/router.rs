//! Traffic router: per-request variant assignment
//!
//! The router is fail-safe: any lookup miss, inactive experiment, or
//! rounding gap degrades to the control variant. Serving traffic matters
//! more than experimentation signal, so `assign` never returns an error.
//!
//! The router holds no mutable state of its own; it reads the active
//! registry and draws randomness from the thread-local generator, so
//! concurrent calls take no locks.

use chrono::Utc;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

use crate::domain::experiment::{
    ExperimentConfig, TrafficAllocation, TrafficSplitStrategy, CONTROL_VARIANT,
};

use super::registry::ActiveRegistry;

/// Size of the hash bucket space for user-hash assignment
const HASH_BUCKETS: u64 = 10_000;

// ============================================================================
// RequestContext
// ============================================================================

/// Per-request attributes the router may use for assignment
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub location: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

// ============================================================================
// FeatureFlagOverride
// ============================================================================

/// Extension point for feature-flag driven assignment
///
/// Without an override the feature-flag strategy always serves control.
pub trait FeatureFlagOverride: Send + Sync + Debug {
    fn variant_for(&self, test_id: &str, ctx: &RequestContext) -> Option<String>;
}

// ============================================================================
// TrafficRouter
// ============================================================================

/// Selects a variant for every request against an active experiment
#[derive(Debug, Clone)]
pub struct TrafficRouter {
    registry: Arc<ActiveRegistry>,
    flag_override: Option<Arc<dyn FeatureFlagOverride>>,
}

impl TrafficRouter {
    pub fn new(registry: Arc<ActiveRegistry>) -> Self {
        Self {
            registry,
            flag_override: None,
        }
    }

    /// Install a feature-flag override hook
    pub fn with_flag_override(mut self, hook: Arc<dyn FeatureFlagOverride>) -> Self {
        self.flag_override = Some(hook);
        self
    }

    /// Assign a variant name for a request
    ///
    /// Returns `"control"` unconditionally when the experiment is unknown or
    /// not active.
    pub fn assign(&self, test_id: &str, ctx: &RequestContext) -> String {
        let Some(active) = self.registry.get(test_id) else {
            return CONTROL_VARIANT.to_string();
        };

        let config = &active.config;
        let variant = match config.traffic_split_strategy() {
            TrafficSplitStrategy::Random => pick_weighted(config.traffic_allocation(), draw()),
            TrafficSplitStrategy::UserHash => match ctx.user_id.as_deref() {
                Some(user_id) => {
                    pick_weighted(config.traffic_allocation(), hash_point(user_id, test_id))
                }
                // No user identity to hash; fall back to a random draw
                None => pick_weighted(config.traffic_allocation(), draw()),
            },
            // Geo segmentation is an extension point; without a segment
            // table this reduces to random and tolerates a missing location
            TrafficSplitStrategy::Geographical => {
                pick_weighted(config.traffic_allocation(), draw())
            }
            TrafficSplitStrategy::GradualRollout => {
                let elapsed = active.elapsed_hours(Utc::now());
                let ramped = rollout_allocation(config, elapsed);
                pick_weighted(&ramped, draw())
            }
            TrafficSplitStrategy::FeatureFlag => self
                .flag_override
                .as_ref()
                .and_then(|hook| hook.variant_for(test_id, ctx))
                .unwrap_or_else(|| CONTROL_VARIANT.to_string()),
        };

        debug!(
            test_id,
            variant,
            strategy = %config.traffic_split_strategy(),
            "assigned variant"
        );

        variant
    }
}

/// Draw a uniform value in [0, 1) from the thread-local generator
fn draw() -> f64 {
    rand::thread_rng().gen_range(0.0..1.0)
}

/// Reduce a user identifier to a stable point in [0, 1)
///
/// The same (user, experiment) pair always lands on the same point, so a
/// fixed allocation always yields the same variant regardless of call time.
pub fn hash_point(user_id: &str, test_id: &str) -> f64 {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    test_id.hash(&mut hasher);
    (hasher.finish() % HASH_BUCKETS) as f64 / HASH_BUCKETS as f64
}

/// Walk the allocation in configuration order, accumulating weight, and
/// return the first variant whose cumulative weight covers the point.
///
/// Falls back to the first configured variant if rounding leaves no match,
/// and to control when the allocation is empty.
pub fn pick_weighted(allocation: &[TrafficAllocation], point: f64) -> String {
    let mut cumulative = 0.0;

    for entry in allocation {
        cumulative += entry.fraction();
        if point < cumulative {
            return entry.variant().to_string();
        }
    }

    allocation
        .first()
        .map(|a| a.variant().to_string())
        .unwrap_or_else(|| CONTROL_VARIANT.to_string())
}

/// Scale the allocation for a gradual rollout
///
/// Non-control shares ramp linearly from zero at start to their configured
/// fraction at `max_duration_hours`; control absorbs the remainder so the
/// total stays 1.0.
pub fn rollout_allocation(config: &ExperimentConfig, elapsed_hours: f64) -> Vec<TrafficAllocation> {
    let ramp = (elapsed_hours / config.max_duration_hours()).clamp(0.0, 1.0);

    let mut scaled = Vec::with_capacity(config.traffic_allocation().len());
    let mut non_control_total = 0.0;
    let mut has_control = false;

    for entry in config.traffic_allocation() {
        if entry.variant() == CONTROL_VARIANT {
            has_control = true;
            // Placeholder; control's share is fixed up below
            scaled.push(TrafficAllocation::new(CONTROL_VARIANT, 0.0));
        } else {
            let fraction = entry.fraction() * ramp;
            non_control_total += fraction;
            scaled.push(TrafficAllocation::new(entry.variant(), fraction));
        }
    }

    let control_share = (1.0 - non_control_total).max(0.0);

    if has_control {
        for entry in &mut scaled {
            if entry.variant() == CONTROL_VARIANT {
                *entry = TrafficAllocation::new(CONTROL_VARIANT, control_share);
            }
        }
    } else {
        scaled.insert(0, TrafficAllocation::new(CONTROL_VARIANT, control_share));
    }

    scaled
}
