//! Metric observation types
//!
//! Observations are append-only and immutable once stored; they are both the
//! input to online analysis and the audit trail of an experiment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded metric value for a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    id: String,
    pub test_id: String,
    pub variant: String,
    pub metric: String,
    pub value: f64,
    pub count: u64,
    pub timestamp: DateTime<Utc>,
}

impl MetricObservation {
    /// Create a new observation with a generated id and the current time
    pub fn new(
        test_id: impl Into<String>,
        variant: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            id: format!("obs-{}", uuid::Uuid::new_v4()),
            test_id: test_id.into(),
            variant: variant.into(),
            metric: metric.into(),
            value,
            count: 1,
            timestamp: Utc::now(),
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}
