use crate::environment::{Action, Environment, Metadata};
use crate::error::EnvError;
use crate::frame::Image;
use crate::input::{Controller, Keys, UserInput};
use crate::spec::{ArraySpec, DType};
use crate::timestep::TimeStep;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::f32::consts::FRAC_PI_4;

const DT: f32 = 0.02;
const GRAVITY: f32 = 9.8;
const FRAME_SIZE: u32 = 48;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickBalanceConfig {
    pub force_scale: f32,
    /// The initial tilt is drawn uniformly from `[-max_tilt, max_tilt]`.
    pub max_tilt: f32,
    pub seed: u64,
}

impl Default for StickBalanceConfig {
    fn default() -> Self {
        Self { force_scale: 10.0, max_tilt: 0.05, seed: 0 }
    }
}

/// Balancing a stick by applying a horizontal force to its base.
///
/// Gravity makes the stick fall unless the operator keeps it upright. Each
/// step in which the stick stays within 45 degrees of vertical is rewarded
/// with 1.
pub struct StickBalanceEnv {
    config: StickBalanceConfig,
    max_steps: Option<u32>,
    rng: fastrand::Rng,
    base_x: f32,
    base_vel: f32,
    angle: f32,
    angular_vel: f32,
    steps: u32,
    needs_reset: bool,
    closed: bool,
}

impl StickBalanceEnv {
    #[must_use]
    pub fn new(config: StickBalanceConfig, max_steps: Option<u32>) -> Self {
        let rng = fastrand::Rng::with_seed(config.seed);
        Self {
            config,
            max_steps,
            rng,
            base_x: 0.0,
            base_vel: 0.0,
            angle: 0.0,
            angular_vel: 0.0,
            steps: 0,
            needs_reset: true,
            closed: false,
        }
    }

    /// Angle of the stick relative to the vertical axis, in radians.
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    fn observation(&self) -> Value {
        json!([self.base_x, self.angle])
    }
}

impl Environment for StickBalanceEnv {
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        self.base_x = 0.0;
        self.base_vel = 0.0;
        self.angle = (self.rng.f32() * 2.0 - 1.0) * self.config.max_tilt;
        self.angular_vel = 0.0;
        self.steps = 0;
        self.needs_reset = false;
        Ok(TimeStep::restart(self.observation()))
    }

    fn step(&mut self, action: &Action) -> Result<TimeStep, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        if self.needs_reset {
            return self.reset();
        }
        let force = action
            .as_f64()
            .ok_or_else(|| EnvError::InvalidAction(format!("expected a number, got {action}")))?
            as f32;
        let force = force.clamp(-self.config.force_scale, self.config.force_scale);

        // Pushing the base accelerates the stick in the opposite direction.
        let angular_acc = GRAVITY * self.angle.sin() - force * self.angle.cos();
        self.angular_vel += angular_acc * DT;
        self.angle += self.angular_vel * DT;
        self.base_vel += force * DT;
        self.base_x += self.base_vel * DT;
        self.steps += 1;

        if self.angle.abs() > FRAC_PI_4 {
            self.needs_reset = true;
            return Ok(TimeStep::termination(0.0, self.observation()));
        }
        if self.max_steps.is_some_and(|max| self.steps >= max) {
            self.needs_reset = true;
            return Ok(TimeStep::truncation(Some(1.0), self.observation()));
        }
        Ok(TimeStep::transition(1.0, self.observation()))
    }

    fn render(&mut self) -> Result<Image, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        let mut image = Image::filled(FRAME_SIZE, FRAME_SIZE, [250, 250, 250]);
        let base_x = (FRAME_SIZE / 2) as f32 + self.base_x * 4.0;
        let base_y = (FRAME_SIZE - 4) as f32;
        let length = (FRAME_SIZE / 2) as f32;
        for i in 0..=32 {
            let t = i as f32 / 32.0;
            let x = base_x + t * length * self.angle.sin();
            let y = base_y - t * length * self.angle.cos();
            if x >= 0.0 && y >= 0.0 {
                image.set_pixel(x.round() as u32, y.round() as u32, [30, 30, 160]);
            }
        }
        Ok(image)
    }

    fn observation_spec(&self) -> Result<ArraySpec, EnvError> {
        Ok(ArraySpec::new("base_x_and_angle", vec![2], DType::F32))
    }

    fn action_spec(&self) -> Result<ArraySpec, EnvError> {
        let scale = f64::from(self.config.force_scale);
        Ok(ArraySpec::bounded("force", Vec::new(), DType::F32, -scale, scale))
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.closed = true;
        Ok(())
    }

    fn metadata(&self) -> Result<Metadata, EnvError> {
        let mut metadata = Metadata::new();
        metadata.insert("family".into(), json!("stick_balance"));
        metadata.insert("seed".into(), json!(self.config.seed));
        Ok(metadata)
    }

    /// Always yields an action; without input the base is left alone.
    fn keys_to_action(&mut self, keys: &Keys) -> Result<Option<Action>, EnvError> {
        let left = keys.get("Left").copied().unwrap_or(0.0);
        let right = keys.get("Right").copied().unwrap_or(0.0);
        Ok(Some(json!((right - left) * self.config.force_scale)))
    }

    fn map_input(&mut self, input: &UserInput) -> Result<Option<Action>, EnvError> {
        match input.controller {
            Controller::SpaceMouse => {
                Ok(Some(json!(input.key("Axis0") * self.config.force_scale)))
            }
            Controller::Default => self.keys_to_action(&input.keys),
        }
    }

    fn step_info(&self) -> Option<Value> {
        Some(json!({ "angular_velocity": self.angular_vel }))
    }
}
