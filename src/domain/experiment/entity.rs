//! Experiment entity: configuration plus lifecycle bookkeeping
//!
//! The entity is the persisted envelope around an immutable
//! [`ExperimentConfig`]. Its state is mutated only through the transition
//! methods, which enforce the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::ExperimentConfig;
use super::state::ExperimentState;
use crate::domain::error::DomainError;

/// A model variant experiment with its lifecycle bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    config: ExperimentConfig,
    state: ExperimentState,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
}

impl Experiment {
    /// Create a new experiment in Planning state
    pub fn new(config: ExperimentConfig, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            config,
            state: ExperimentState::Planning,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            winner: None,
            stop_reason: None,
        }
    }

    pub fn test_id(&self) -> &str {
        self.config.test_id()
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    // Status transitions

    /// Start the experiment (Planning -> Running)
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(ExperimentState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Pause the experiment (Running -> Paused)
    pub fn pause(&mut self) -> Result<(), DomainError> {
        self.transition(ExperimentState::Paused)
    }

    /// Resume the experiment (Paused -> Running)
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.transition(ExperimentState::Running)
    }

    /// Complete the experiment, recording the winner and reason
    pub fn complete(
        &mut self,
        winner: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<(), DomainError> {
        self.transition(ExperimentState::Completed)?;
        self.completed_at = Some(Utc::now());
        self.winner = Some(winner.into());
        self.stop_reason = Some(reason.into());
        Ok(())
    }

    /// Mark the experiment as failed
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(ExperimentState::Failed)?;
        self.completed_at = Some(Utc::now());
        self.stop_reason = Some(reason.into());
        Ok(())
    }

    /// Cancel the experiment
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(ExperimentState::Cancelled)?;
        self.completed_at = Some(Utc::now());
        self.stop_reason = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, target: ExperimentState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(target) {
            return Err(DomainError::invalid_state(format!(
                "Experiment '{}' cannot transition from {} to {}",
                self.test_id(),
                self.state,
                target
            )));
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}
