//! Experiment lifecycle state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    /// Experiment is configured but not yet serving traffic
    #[default]
    Planning,
    /// Experiment is actively routing traffic and collecting metrics
    Running,
    /// Experiment is temporarily paused
    Paused,
    /// Experiment finished with a final analysis
    Completed,
    /// Experiment was aborted by an unrecoverable error
    Failed,
    /// Experiment was cancelled before producing a decision
    Cancelled,
}

impl ExperimentState {
    /// Check if the experiment is currently routing traffic
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the state is terminal (immutable once reached)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if a transition to the target state is valid
    pub fn can_transition_to(&self, target: ExperimentState) -> bool {
        match (self, target) {
            // Planning -> Running (start)
            (Self::Planning, Self::Running) => true,
            // Planning can be abandoned
            (Self::Planning, Self::Cancelled) => true,
            // Running -> Paused (pause)
            (Self::Running, Self::Paused) => true,
            // Running -> terminal
            (Self::Running, Self::Completed) => true,
            (Self::Running, Self::Failed) => true,
            (Self::Running, Self::Cancelled) => true,
            // Paused -> Running (resume)
            (Self::Paused, Self::Running) => true,
            // Paused -> terminal
            (Self::Paused, Self::Completed) => true,
            (Self::Paused, Self::Cancelled) => true,
            // All other transitions are invalid
            _ => false,
        }
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
