use environment::{ArraySpec, DType, Specs, TimeStep};
use episode::*;
use serde_json::{json, Value};
use std::path::Path;

pub const STUDY: &str = "study";
pub const SESSION: &str = "session";
pub const ENV: &str = "sphere";

pub fn specs() -> Specs {
    Specs {
        observation: ArraySpec::new("position", vec![1], DType::F32),
        action: ArraySpec::scalar("force"),
        reward: ArraySpec::scalar("reward"),
        discount: ArraySpec::bounded("discount", Vec::new(), DType::F64, 0.0, 1.0),
    }
}

/// Steps of an episode with `num_steps` transitions after the first step.
/// Every transition has reward `reward` and action `index`; the last one
/// terminates the episode.
pub fn make_steps(num_steps: usize, reward: f64, first_custom: Value) -> Vec<StepData> {
    let mut steps = vec![StepData::new(TimeStep::restart(json!([0])), Value::Null, first_custom)];
    for i in 1..=num_steps {
        let timestep = if i == num_steps {
            TimeStep::termination(reward, json!([i]))
        } else {
            TimeStep::transition(reward, json!([i]))
        };
        let custom = json!({
            METADATA_IMAGE: "frame",
            METADATA_KEYS: { "Right": 1.0 },
            METADATA_INFO: { "steps": i },
            "dummy": i,
        });
        steps.push(StepData::new(timestep, json!(i), custom));
    }
    steps
}

/// Writes an episode to `dir` and returns its record.
pub fn record_episode(
    dir: &Path,
    id: &str,
    num_steps: usize,
    reward: f64,
    first_custom: Value,
) -> Episode {
    let factory = JsonStorageFactory;
    let mut writer = factory
        .create_writer(JSON_KIND, &dir.join(id), specs(), Default::default())
        .unwrap();
    writer.start_episode().unwrap();
    for step in make_steps(num_steps, reward, first_custom) {
        writer.record_step(step).unwrap();
    }
    let mut metadata = environment::Metadata::new();
    metadata.insert("recorded".into(), json!(id));
    let storage = writer.end_episode(metadata).unwrap();
    writer.close().unwrap();
    Episode {
        id: id.to_string(),
        study_id: STUDY.into(),
        session_id: SESSION.into(),
        environment_id: ENV.into(),
        user: User::new("operator@example.com"),
        state: EpisodeState::Completed,
        num_steps,
        total_reward: reward * num_steps as f64,
        storage: Some(storage),
        ..Episode::default()
    }
}

pub fn tag(episode: &mut Episode, index: usize, label: &str) {
    episode.step_metadata.entry(index).or_default().tags.push(Tag::new(label));
}
