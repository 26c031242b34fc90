use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    First,
    Mid,
    Last,
}

/// The `(step_type, reward, discount, observation)` tuple returned by
/// [`crate::Environment::reset`] and [`crate::Environment::step`].
///
/// Reward and discount are absent on the first step of an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStep {
    pub step_type: StepType,
    pub reward: Option<f64>,
    pub discount: Option<f64>,
    pub observation: Value,
}

impl TimeStep {
    #[must_use]
    pub fn restart(observation: Value) -> Self {
        Self { step_type: StepType::First, reward: None, discount: None, observation }
    }

    #[must_use]
    pub fn transition(reward: f64, observation: Value) -> Self {
        Self { step_type: StepType::Mid, reward: Some(reward), discount: Some(1.0), observation }
    }

    /// Terminal step of an episode that ended on its own.
    #[must_use]
    pub fn termination(reward: f64, observation: Value) -> Self {
        Self { step_type: StepType::Last, reward: Some(reward), discount: Some(0.0), observation }
    }

    /// Terminal step of an episode that was cut short. The discount stays 1.
    #[must_use]
    pub fn truncation(reward: Option<f64>, observation: Value) -> Self {
        Self { step_type: StepType::Last, reward, discount: Some(1.0), observation }
    }

    #[must_use]
    pub fn first(&self) -> bool {
        self.step_type == StepType::First
    }

    #[must_use]
    pub fn mid(&self) -> bool {
        self.step_type == StepType::Mid
    }

    #[must_use]
    pub fn last(&self) -> bool {
        self.step_type == StepType::Last
    }
}
