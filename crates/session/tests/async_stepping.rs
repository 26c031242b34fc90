mod common;

use common::*;
use session::*;
use std::thread;
use std::time::Duration;

fn steps(responses: &[Response]) -> Vec<usize> {
    responses
        .iter()
        .filter_map(|r| match r {
            Response::Step { episode_steps, .. } => Some(*episode_steps),
            _ => None,
        })
        .collect()
}

#[test]
fn async_environments_start_paused() {
    let h = Harness::new(CREATOR);
    h.request(Request::SelectStudy { study_id: STUDY.into() });
    let responses = h.request(Request::SelectEnvironment { env_id: "drift".into() });
    assert_eq!(responses[0], Response::Pause { paused: true });
    assert!(matches!(&responses[1], Response::Step { episode_steps: 0, .. }));
    assert!(h.controller.is_paused());
    assert!(collect_for(&h.responses, Duration::from_millis(200)).is_empty());
}

#[test]
fn async_environments_step_at_the_configured_rate() {
    let h = Harness::with_config(CREATOR, seed_storage(), |config| config.fps = 10.0);
    h.start("drift");
    let mut responses = h.press(&[PAUSE_KEY]);
    assert_eq!(responses[0], Response::Pause { paused: false });
    responses.extend(collect_for(&h.responses, Duration::from_secs(1)));

    let steps = steps(&responses);
    assert!((7..=13).contains(&steps.len()), "{} steps", steps.len());
    let expected: Vec<_> = (1..=steps.len()).collect();
    assert_eq!(steps, expected);
}

#[test]
fn pausing_stops_the_timer() {
    let h = Harness::with_config(CREATOR, seed_storage(), |config| config.fps = 50.0);
    h.start("drift");
    h.press(&[PAUSE_KEY]);
    thread::sleep(Duration::from_millis(100));
    let responses = h.press(&[PAUSE_KEY]);
    assert_eq!(responses.last(), Some(&Response::Pause { paused: true }));
    assert!(!steps(&responses).is_empty());
    assert!(collect_for(&h.responses, Duration::from_millis(200)).is_empty());
}

#[test]
fn idle_operators_are_paused() {
    let h = Harness::with_config(CREATOR, seed_storage(), |config| {
        config.fps = 20.0;
        config.idle_timeout_secs = 0.3;
    });
    h.start("drift");
    h.press(&[PAUSE_KEY]);
    let responses = collect_for(&h.responses, Duration::from_secs(1));
    assert_eq!(responses.last(), Some(&Response::Pause { paused: true }));
    // Roughly idle_timeout * fps steps ran before the pause.
    let count = steps(&responses).len();
    assert!((2..=10).contains(&count), "{count} steps");
    assert!(h.controller.is_paused());
}

#[test]
fn input_keeps_async_environments_running() {
    let h = Harness::with_config(CREATOR, seed_storage(), |config| {
        config.fps = 20.0;
        config.idle_timeout_secs = 0.3;
    });
    h.start("drift");
    h.press(&[PAUSE_KEY]);
    for _ in 0..6 {
        thread::sleep(Duration::from_millis(100));
        h.press(&["ArrowRight"]);
    }
    assert!(!h.controller.is_paused());
    let episode = h.controller.current_episode().unwrap();
    assert_eq!(episode.state, episode::EpisodeState::Active);
}
