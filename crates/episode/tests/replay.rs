mod common;

use chrono::Utc;
use common::*;
use environment::{EnvironmentKind, EnvironmentSpec, RollingSphereConfig};
use episode::*;
use serde_json::json;
use std::sync::Arc;

fn setup(dir: &std::path::Path) -> (Arc<MemoryStorage>, Episode) {
    let storage = Arc::new(MemoryStorage::new());
    let spec = StudySpec {
        id: STUDY.into(),
        creator: User::new("a@x"),
        environment_specs: vec![EnvironmentSpec {
            id: ENV.into(),
            name: "Sphere".into(),
            sync: true,
            max_episode_steps: None,
            kind: EnvironmentKind::RollingSphere(RollingSphereConfig::default()),
        }],
        ..StudySpec::default()
    };
    storage.create_study(spec).unwrap();
    let session = Session {
        id: SESSION.into(),
        study_id: STUDY.into(),
        start_time: Some(Utc::now()),
        ..Session::default()
    };
    storage.create_session(&session).unwrap();
    let episode = record_episode(dir, "0.0", 3, 1.0, json!({}));
    storage.create_episode(&episode).unwrap();
    (storage, episode)
}

#[test]
fn storage_replay_edits_tags_and_notes() {
    let dir = tempfile::tempdir().unwrap();
    let (storage, episode) = setup(dir.path());
    let mut replay =
        StorageReplay::new(storage.clone(), &JsonStorageFactory, STUDY, SESSION, &episode.id)
            .unwrap();
    assert_eq!(replay.steps().len(), 4);
    assert_eq!(replay.env_spec().unwrap().id, ENV);
    assert_eq!(replay.step(2).unwrap().action, json!(2));

    assert!(replay.add_episode_tag("good").unwrap());
    assert!(!replay.add_episode_tag("good").unwrap());
    assert_eq!(replay.episode().tag_labels(), vec!["good"]);
    assert!(replay.remove_episode_tag("good").unwrap());
    assert!(!replay.remove_episode_tag("good").unwrap());

    assert!(replay.update_episode("looks fine").unwrap());
    assert_eq!(replay.episode().notes, "looks fine");

    assert!(replay.add_step_tag(1, "end").unwrap());
    assert!(!replay.add_step_tag(1, "end").unwrap());
    let stored = storage.get_episode(STUDY, SESSION, &episode.id).unwrap().unwrap();
    assert_eq!(stored.step_metadata[&1].tags, vec![Tag::new("end")]);
    assert_eq!(stored.notes, "looks fine");

    assert!(!replay.remove_step_tag(2, "end").unwrap());
    assert!(replay.remove_step_tag(1, "end").unwrap());
    assert!(replay.episode().step_metadata.is_empty());

    assert!(matches!(replay.add_step_tag(4, "end"), Err(EpisodeError::Invalid(_))));
    assert!(matches!(replay.remove_step_tag(9, "end"), Err(EpisodeError::Invalid(_))));
}

#[test]
fn storage_replay_reports_missing_records() {
    let dir = tempfile::tempdir().unwrap();
    let (storage, _) = setup(dir.path());
    let result = StorageReplay::new(storage, &JsonStorageFactory, STUDY, SESSION, "4.2");
    match result {
        Err(err) => assert_eq!(err.to_string(), "Missing episode."),
        Ok(_) => panic!("replay of a missing episode"),
    }
}

#[test]
fn static_replay_is_read_only() {
    let steps = make_steps(3, 2.0, json!({}));
    let mut replay = StaticReplay::new(steps, "file", "episode", None);
    assert_eq!(replay.episode().num_steps, 3);
    assert_eq!(replay.episode().total_reward, 6.0);
    assert_eq!(replay.episode().state, EpisodeState::Completed);
    assert!(replay.env_spec().is_none());
    assert!(replay.step(3).is_some());
    assert!(replay.step(4).is_none());

    let err = replay.add_episode_tag("x").unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.to_string(), "Not supported for file based replays.");
    assert!(replay.update_episode("notes").is_err());
    assert!(replay.add_step_tag(0, "x").is_err());
}
