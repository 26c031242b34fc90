mod common;

use common::*;
use environment::TimeStep;
use episode::*;
use serde_json::{json, Value};
use std::sync::Arc;

/// Drives the merger to the end and returns every timestep together with
/// its custom data and the number of episodes started.
fn drain(merger: &mut Merger) -> (Vec<(TimeStep, Value)>, usize) {
    let mut out = Vec::new();
    let mut resets = 0;
    while !merger.done() {
        let mut timestep = merger.reset().unwrap();
        resets += 1;
        out.push((timestep.clone(), merger.custom_data().clone()));
        while !timestep.last() {
            let action = merger.next_action().cloned().unwrap();
            timestep = merger.step(&action).unwrap();
            out.push((timestep.clone(), merger.custom_data().clone()));
        }
    }
    (out, resets)
}

fn merger(episodes: Vec<Episode>, options: MergerOptions) -> Merger {
    Merger::new(episodes, Arc::new(JsonStorageFactory), options).unwrap()
}

#[test]
fn merges_episodes_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let episodes: Vec<_> = [(15, 1.0), (20, 0.5), (3, 2.0)]
        .iter()
        .enumerate()
        .map(|(i, (n, r))| record_episode(dir.path(), &format!("0.{i}"), *n, *r, json!({})))
        .collect();

    for prefetch in [1, 2, 4] {
        let options = MergerOptions { prefetch, ..MergerOptions::default() };
        let mut merger = merger(episodes.clone(), options);
        assert_eq!(merger.specs(), &specs());
        let (steps, resets) = drain(&mut merger);
        assert_eq!(resets, 3);
        assert_eq!(steps.len(), 16 + 21 + 4);
        assert!(merger.done());

        // Observations restart with every episode.
        let firsts: Vec<usize> =
            steps.iter().enumerate().filter(|(_, (t, _))| t.first()).map(|(i, _)| i).collect();
        assert_eq!(firsts, vec![0, 16, 37]);
        assert_eq!(steps[15].0, TimeStep::termination(1.0, json!([15])));
        assert!(merger.reset().is_err());
    }
}

#[test]
fn episode_metadata_is_recomputed() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = record_episode(dir.path(), "0.0", 2, 1.0, json!({}));
    first.tags = vec![Tag::new("good")];
    first.notes = "steady hand".into();
    let second = record_episode(
        dir.path(),
        "0.1",
        2,
        1.0,
        json!({ "episode_metadata": { "legacy": true }, "dummy": 0 }),
    );
    let mut merger = merger(vec![first, second], MergerOptions::default());

    merger.reset().unwrap();
    let metadata = merger.episode_metadata().clone();
    assert_eq!(metadata["episode_index"], json!(0));
    assert_eq!(metadata["num_steps"], json!(2));
    assert_eq!(metadata["total_reward"], json!(2.0));
    assert_eq!(metadata["recorded"], json!("0.0"));
    assert_eq!(metadata["tags"], json!(["good"]));
    assert_eq!(metadata["notes"], json!("steady hand"));
    merger.step(&Value::Null).unwrap();
    merger.step(&Value::Null).unwrap();

    merger.reset().unwrap();
    let metadata = merger.episode_metadata();
    assert_eq!(metadata["episode_index"], json!(1));
    assert_eq!(metadata["legacy"], json!(true));
    assert!(metadata.get("tags").is_none());
    // The legacy key is moved out of the step data.
    assert_eq!(merger.custom_data(), &json!({ "dummy": 0 }));
}

#[test]
fn end_tags_truncate_episodes() {
    let dir = tempfile::tempdir().unwrap();
    let mut episode = record_episode(dir.path(), "0.0", 10, 1.5, json!({}));
    tag(&mut episode, 5, "end");
    tag(&mut episode, 3, "end");
    tag(&mut episode, 2, "other");
    let options =
        MergerOptions { end_of_episode_tags: vec!["end".into()], ..MergerOptions::default() };
    let mut merger = merger(vec![episode], options);

    let (steps, resets) = drain(&mut merger);
    assert_eq!(resets, 1);
    assert_eq!(steps.len(), 4);
    let last = &steps[3].0;
    assert!(last.last());
    assert_eq!(last.discount, Some(1.0));
    assert_eq!(last.reward, Some(1.5));
    assert_eq!(last.observation, json!([3]));
    assert_eq!(merger.episode_metadata()["num_steps"], json!(3));
    assert_eq!(merger.episode_metadata()["total_reward"], json!(4.5));
}

#[test]
fn end_tag_on_the_last_step_keeps_termination() {
    let dir = tempfile::tempdir().unwrap();
    let mut episode = record_episode(dir.path(), "0.0", 4, 1.0, json!({}));
    tag(&mut episode, 4, "end");
    // Tags beyond the recorded steps are ignored.
    tag(&mut episode, 40, "end");
    let options =
        MergerOptions { end_of_episode_tags: vec!["end".into()], ..MergerOptions::default() };
    let (steps, _) = drain(&mut merger(vec![episode], options));
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[4].0.discount, Some(0.0));
}

#[test]
fn step_tags_become_flags() {
    let dir = tempfile::tempdir().unwrap();
    let mut a = record_episode(dir.path(), "0.0", 2, 1.0, json!({}));
    let mut b = record_episode(dir.path(), "0.1", 2, 1.0, Value::Null);
    tag(&mut a, 1, "good");
    tag(&mut b, 2, "bad");
    let options = MergerOptions {
        add_step_tags_as_metadata: true,
        strip_internal_metadata: true,
        ..MergerOptions::default()
    };
    let (steps, _) = drain(&mut merger(vec![a, b], options));
    assert_eq!(steps.len(), 6);
    assert_eq!(steps[0].1, json!({ "tag:bad": false, "tag:good": false }));
    assert_eq!(steps[1].1, json!({ "dummy": 1, "tag:bad": false, "tag:good": true }));
    assert_eq!(steps[3].1, json!({ "tag:bad": false, "tag:good": false }));
    assert_eq!(steps[5].1, json!({ "dummy": 2, "tag:bad": true, "tag:good": false }));
}

#[test]
fn internal_keys_are_kept_unless_stripped() {
    let dir = tempfile::tempdir().unwrap();
    let mut episode = record_episode(dir.path(), "0.0", 1, 1.0, json!({}));
    episode.tags = vec![Tag::new("good")];

    let (steps, _) = drain(&mut merger(vec![episode.clone()], MergerOptions::default()));
    assert_eq!(steps[1].1[METADATA_IMAGE], json!("frame"));

    let options = MergerOptions { strip_internal_metadata: true, ..MergerOptions::default() };
    let mut stripped = merger(vec![episode], options);
    let (steps, _) = drain(&mut stripped);
    assert_eq!(steps[1].1, json!({ "dummy": 1 }));
    assert!(stripped.episode_metadata().get("tags").is_none());
}

#[test]
fn missing_data_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut episode = record_episode(dir.path(), "0.0", 1, 1.0, json!({}));
    episode.storage = Some(StorageSpec::Json { path: dir.path().join("nope.json") });
    let result = Merger::new(vec![episode], Arc::new(JsonStorageFactory), MergerOptions::default());
    assert!(matches!(result, Err(EpisodeError::Missing(_))));

    let result = Merger::new(Vec::new(), Arc::new(JsonStorageFactory), MergerOptions::default());
    assert!(matches!(result, Err(EpisodeError::Invalid(_))));
}
