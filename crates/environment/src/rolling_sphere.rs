use crate::environment::{Action, Camera, Environment, Metadata};
use crate::error::EnvError;
use crate::frame::Image;
use crate::input::Keys;
use crate::spec::{ArraySpec, DType};
use crate::timestep::TimeStep;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const CAMERAS: [&str; 2] = ["side", "top"];
const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingSphereConfig {
    /// Force applied while a direction key is held.
    pub force_scale: f32,
    /// The episode terminates once the sphere leaves `[-limit, limit]`.
    pub position_limit: f32,
}

impl Default for RollingSphereConfig {
    fn default() -> Self {
        Self { force_scale: 10.0, position_limit: 5.0 }
    }
}

/// A sphere on a line, pushed left or right by the operator.
///
/// The reward of a step is the displacement it caused.
pub struct RollingSphereEnv {
    config: RollingSphereConfig,
    max_steps: Option<u32>,
    pos_x: f32,
    steps: u32,
    camera: u32,
    needs_reset: bool,
    closed: bool,
}

impl RollingSphereEnv {
    #[must_use]
    pub fn new(config: RollingSphereConfig, max_steps: Option<u32>) -> Self {
        Self { config, max_steps, pos_x: 0.0, steps: 0, camera: 0, needs_reset: true, closed: false }
    }

    #[must_use]
    pub fn position(&self) -> f32 {
        self.pos_x
    }

    fn observation(&self) -> Value {
        json!([self.pos_x])
    }

    fn check_open(&self) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        Ok(())
    }
}

impl Environment for RollingSphereEnv {
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        self.check_open()?;
        self.pos_x = 0.0;
        self.steps = 0;
        self.needs_reset = false;
        Ok(TimeStep::restart(self.observation()))
    }

    fn step(&mut self, action: &Action) -> Result<TimeStep, EnvError> {
        self.check_open()?;
        if self.needs_reset {
            return self.reset();
        }
        // A null action lets the sphere coast.
        let force = match action {
            Value::Null => 0.0,
            other => other.as_f64().ok_or_else(|| {
                EnvError::InvalidAction(format!("expected a number, got {other}"))
            })?,
        } as f32;
        let force = force.clamp(-self.config.force_scale, self.config.force_scale);
        let old_pos_x = self.pos_x;
        self.pos_x += force * 0.02;
        self.steps += 1;
        let reward = f64::from(self.pos_x - old_pos_x);
        if self.pos_x.abs() > self.config.position_limit {
            self.needs_reset = true;
            return Ok(TimeStep::termination(reward, self.observation()));
        }
        if self.max_steps.is_some_and(|max| self.steps >= max) {
            self.needs_reset = true;
            return Ok(TimeStep::truncation(Some(reward), self.observation()));
        }
        Ok(TimeStep::transition(reward, self.observation()))
    }

    fn render(&mut self) -> Result<Image, EnvError> {
        self.check_open()?;
        let (background, sphere) = if self.camera == 0 {
            ([230, 230, 230], [200, 40, 40])
        } else {
            ([40, 40, 60], [240, 200, 40])
        };
        let mut image = Image::filled(FRAME_WIDTH, FRAME_HEIGHT, background);
        let limit = self.config.position_limit.max(f32::EPSILON);
        let t = ((self.pos_x / limit).clamp(-1.0, 1.0) + 1.0) / 2.0;
        let center = (t * (FRAME_WIDTH - 1) as f32).round() as i64;
        for y in 4..12 {
            for x in (center - 3)..=(center + 3) {
                if let Ok(x) = u32::try_from(x) {
                    image.set_pixel(x, y, sphere);
                }
            }
        }
        Ok(image)
    }

    fn observation_spec(&self) -> Result<ArraySpec, EnvError> {
        let limit = f64::from(self.config.position_limit);
        Ok(ArraySpec::bounded("position", vec![1], DType::F32, -limit, limit))
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
        metadata.insert("family".into(), json!("rolling_sphere"));
        metadata.insert("position_limit".into(), json!(self.config.position_limit));
        metadata.insert("cameras".into(), json!(CAMERAS));
        Ok(metadata)
    }

    fn set_camera(&mut self, index: u32) -> Result<Option<Camera>, EnvError> {
        self.check_open()?;
        let Some(name) = CAMERAS.get(index as usize) else {
            return Ok(None);
        };
        self.camera = index;
        Ok(Some(Camera { index, name: (*name).to_string() }))
    }

    fn keys_to_action(&mut self, keys: &Keys) -> Result<Option<Action>, EnvError> {
        let left = keys.get("Left").copied();
        let right = keys.get("Right").copied();
        if left.is_none() && right.is_none() {
            return Ok(None);
        }
        let force = (right.unwrap_or(0.0) - left.unwrap_or(0.0)) * self.config.force_scale;
        Ok(Some(json!(force)))
    }

    fn step_info(&self) -> Option<Value> {
        Some(json!({ "steps": self.steps }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaving_the_track_terminates() {
        let mut env = RollingSphereEnv::new(
            RollingSphereConfig { force_scale: 10.0, position_limit: 0.5 },
            None,
        );
        env.reset().unwrap();
        let mut last = env.step(&json!(10.0)).unwrap();
        let mut steps = 1;
        while !last.last() {
            last = env.step(&json!(10.0)).unwrap();
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert_eq!(last.discount, Some(0.0));
        // The next step starts a new episode.
        assert!(env.step(&json!(1.0)).unwrap().first());
    }

    #[test]
    fn step_limit_truncates() {
        let mut env = RollingSphereEnv::new(RollingSphereConfig::default(), Some(2));
        env.reset().unwrap();
        assert!(env.step(&json!(0.0)).unwrap().mid());
        let last = env.step(&json!(0.0)).unwrap();
        assert!(last.last());
        assert_eq!(last.discount, Some(1.0));
    }

    #[test]
    fn non_numeric_actions_are_rejected() {
        let mut env = RollingSphereEnv::new(RollingSphereConfig::default(), None);
        env.reset().unwrap();
        assert!(matches!(env.step(&json!("left")), Err(EnvError::InvalidAction(_))));
    }
}
