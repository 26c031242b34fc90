use crate::error::EnvError;
use crate::frame::Image;
use crate::input::{Keys, UserInput};
use crate::spec::{ArraySpec, DType, Specs};
use crate::timestep::TimeStep;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment actions are arbitrary JSON values; their shape is described
/// by [`Environment::action_spec`].
pub type Action = Value;

/// Free-form environment metadata, stored with every recorded episode.
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camera {
    pub index: u32,
    pub name: String,
}

/// An environment that can be driven by a human operator.
///
/// Modelled after the usual reset/step loop of RL frameworks: each call to
/// [`step`] advances the simulation by one action and returns a [`TimeStep`].
/// The remaining methods serve the operator: [`render`] produces the frame
/// shown to them and [`map_input`] converts their input into an action.
///
/// [`step`]: Environment::step
/// [`render`]: Environment::render
/// [`map_input`]: Environment::map_input
pub trait Environment: Send {
    /// Reset the environment and return the first timestep of a new episode.
    fn reset(&mut self) -> Result<TimeStep, EnvError>;

    /// Advance the environment by one action. Asynchronous environments are
    /// also stepped without operator input, with a null action.
    fn step(&mut self, action: &Action) -> Result<TimeStep, EnvError>;

    fn render(&mut self) -> Result<Image, EnvError>;

    fn observation_spec(&self) -> Result<ArraySpec, EnvError>;

    fn action_spec(&self) -> Result<ArraySpec, EnvError>;

    fn reward_spec(&self) -> Result<ArraySpec, EnvError> {
        Ok(ArraySpec::scalar("reward"))
    }

    fn discount_spec(&self) -> Result<ArraySpec, EnvError> {
        Ok(ArraySpec::bounded("discount", Vec::new(), DType::F64, 0.0, 1.0))
    }

    fn specs(&self) -> Result<Specs, EnvError> {
        Ok(Specs {
            observation: self.observation_spec()?,
            action: self.action_spec()?,
            reward: self.reward_spec()?,
            discount: self.discount_spec()?,
        })
    }

    /// Release the resources of the environment. Later calls may fail.
    fn close(&mut self) -> Result<(), EnvError>;

    fn metadata(&self) -> Result<Metadata, EnvError> {
        Ok(Metadata::new())
    }

    /// Switches to the camera with the given index and returns it, or `None`
    /// if the environment has no such camera.
    fn set_camera(&mut self, _index: u32) -> Result<Option<Camera>, EnvError> {
        Ok(None)
    }

    /// Maps the active keys to an action. `None` means that there is no
    /// action, i.e. the environment should not be stepped.
    fn keys_to_action(&mut self, keys: &Keys) -> Result<Option<Action>, EnvError>;

    fn map_input(&mut self, input: &UserInput) -> Result<Option<Action>, EnvError> {
        self.keys_to_action(&input.keys)
    }

    /// Auxiliary information about the last step, recorded with it.
    fn step_info(&self) -> Option<Value> {
        None
    }
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, action: &Action) -> Result<TimeStep, EnvError> {
        (**self).step(action)
    }

    fn render(&mut self) -> Result<Image, EnvError> {
        (**self).render()
    }

    fn observation_spec(&self) -> Result<ArraySpec, EnvError> {
        (**self).observation_spec()
    }

    fn action_spec(&self) -> Result<ArraySpec, EnvError> {
        (**self).action_spec()
    }

    fn reward_spec(&self) -> Result<ArraySpec, EnvError> {
        (**self).reward_spec()
    }

    fn discount_spec(&self) -> Result<ArraySpec, EnvError> {
        (**self).discount_spec()
    }

    fn close(&mut self) -> Result<(), EnvError> {
        (**self).close()
    }

    fn metadata(&self) -> Result<Metadata, EnvError> {
        (**self).metadata()
    }

    fn set_camera(&mut self, index: u32) -> Result<Option<Camera>, EnvError> {
        (**self).set_camera(index)
    }

    fn keys_to_action(&mut self, keys: &Keys) -> Result<Option<Action>, EnvError> {
        (**self).keys_to_action(keys)
    }

    fn map_input(&mut self, input: &UserInput) -> Result<Option<Action>, EnvError> {
        (**self).map_input(input)
    }

    fn step_info(&self) -> Option<Value> {
        (**self).step_info()
    }
}
