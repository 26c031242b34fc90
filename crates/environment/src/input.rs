use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Active keys and their values.
///
/// Digital keys, e.g. keyboard keys, have the value 1. Analog inputs from a
/// gamepad are in `[-1, 1]` for stick axes and in `(0, 1]` for buttons.
pub type Keys = BTreeMap<String, f32>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    #[default]
    Default,
    /// A 3Dconnexion SpaceMouse: six axes and two buttons.
    SpaceMouse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    pub keys: Keys,
    #[serde(default)]
    pub controller: Controller,
}

impl UserInput {
    #[must_use]
    pub fn new(keys: Keys, controller: Controller) -> Self {
        Self { keys, controller }
    }

    #[must_use]
    pub fn key(&self, name: &str) -> f32 {
        self.keys.get(name).copied().unwrap_or(0.0)
    }
}
