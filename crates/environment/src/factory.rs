use crate::environment::Environment;
use crate::error::EnvError;
use crate::rolling_sphere::{RollingSphereConfig, RollingSphereEnv};
use crate::stick_balance::{StickBalanceConfig, StickBalanceEnv};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Serialisable description of an environment offered by a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub id: String,
    pub name: String,
    /// Synchronous environments are only stepped on operator input;
    /// asynchronous ones are stepped by a timer.
    #[serde(default)]
    pub sync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_episode_steps: Option<u32>,
    pub kind: EnvironmentKind,
}

/// The environment family together with its family specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum EnvironmentKind {
    RollingSphere(RollingSphereConfig),
    StickBalance(StickBalanceConfig),
}

impl EnvironmentKind {
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            EnvironmentKind::RollingSphere(_) => "rolling_sphere",
            EnvironmentKind::StickBalance(_) => "stick_balance",
        }
    }
}

pub trait EnvironmentFactory: Send + Sync {
    fn create(&self, spec: &EnvironmentSpec) -> Result<Box<dyn Environment>, EnvError>;
}

/// Creates the environment families shipped with this crate in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinFactory;

impl EnvironmentFactory for BuiltinFactory {
    fn create(&self, spec: &EnvironmentSpec) -> Result<Box<dyn Environment>, EnvError> {
        info!(id = %spec.id, family = spec.kind.family(), "Creating environment");
        let env: Box<dyn Environment> = match &spec.kind {
            EnvironmentKind::RollingSphere(config) => {
                Box::new(RollingSphereEnv::new(config.clone(), spec.max_episode_steps))
            }
            EnvironmentKind::StickBalance(config) => {
                Box::new(StickBalanceEnv::new(config.clone(), spec.max_episode_steps))
            }
        };
        Ok(env)
    }
}
