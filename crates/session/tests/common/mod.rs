#![allow(dead_code)]

use crossbeam_channel::Receiver;
use environment::{BuiltinFactory, EnvironmentKind, EnvironmentSpec, RollingSphereConfig};
use episode::*;
use session::*;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const CREATOR: &str = "creator@example.com";
pub const OPERATOR: &str = "operator@example.com";
pub const STUDY: &str = "study";
pub const PRIVATE_STUDY: &str = "private";

/// Synchronous sphere whose episodes end after three steps.
pub fn sphere_spec() -> EnvironmentSpec {
    EnvironmentSpec {
        id: "sphere".into(),
        name: "Rolling sphere".into(),
        sync: true,
        max_episode_steps: Some(3),
        kind: EnvironmentKind::RollingSphere(RollingSphereConfig::default()),
    }
}

/// Asynchronous sphere that coasts without input and never ends.
pub fn drift_spec() -> EnvironmentSpec {
    EnvironmentSpec {
        id: "drift".into(),
        name: "Drifting sphere".into(),
        sync: false,
        max_episode_steps: None,
        kind: EnvironmentKind::RollingSphere(RollingSphereConfig::default()),
    }
}

pub fn seed_storage() -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .create_study(StudySpec {
            id: STUDY.into(),
            name: "Spheres".into(),
            creator: User::new(CREATOR),
            state: StudyState::Enabled,
            environment_specs: vec![sphere_spec(), drift_spec()],
            ..StudySpec::default()
        })
        .unwrap();
    storage
        .create_study(StudySpec {
            id: PRIVATE_STUDY.into(),
            name: "Private".into(),
            creator: User::new(CREATOR),
            state: StudyState::Disabled,
            environment_specs: vec![sphere_spec()],
            ..StudySpec::default()
        })
        .unwrap();
    storage
}

pub struct Harness {
    pub controller: SessionController,
    pub responses: Receiver<Response>,
    pub storage: Arc<MemoryStorage>,
    pub logs: TempDir,
}

impl Harness {
    pub fn new(email: &str) -> Self {
        Self::with_config(email, seed_storage(), |_| {})
    }

    pub fn with_config(
        email: &str,
        storage: Arc<MemoryStorage>,
        configure: impl FnOnce(&mut SessionConfig),
    ) -> Self {
        let logs = tempfile::tempdir().unwrap();
        let mut config = SessionConfig { base_log_dir: logs.path().to_path_buf(), ..SessionConfig::default() };
        configure(&mut config);
        let (sink, responses) = ChannelSink::new();
        let ctx = SessionContext {
            storage: storage.clone(),
            env_factory: Arc::new(BuiltinFactory),
            episode_factory: Arc::new(JsonStorageFactory),
            sink: Arc::new(sink),
        };
        let controller = SessionController::new(User::new(email), config, ctx).unwrap();
        Self { controller, responses, storage, logs }
    }

    pub fn request(&self, request: Request) -> Vec<Response> {
        self.controller.handle_request(request);
        self.drain()
    }

    pub fn drain(&self) -> Vec<Response> {
        self.responses.try_iter().collect()
    }

    pub fn press(&self, keys: &[&str]) -> Vec<Response> {
        self.request(Request::Action {
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            gamepad: GamepadInput::default(),
        })
    }

    /// Selects the study and the environment, discarding the responses.
    pub fn start(&self, env_id: &str) {
        self.request(Request::SelectStudy { study_id: STUDY.into() });
        self.request(Request::SelectEnvironment { env_id: env_id.into() });
    }

    /// Plays a full episode of the sphere and keeps it as completed.
    pub fn record_completed(&self) -> EpisodeRef {
        let episode_id = self.controller.current_episode().unwrap().id;
        for _ in 0..3 {
            self.press(&["ArrowRight"]);
        }
        self.request(Request::SaveEpisode { accept: true, mark_as_completed: true });
        let reference = EpisodeRef {
            study_id: STUDY.into(),
            session_id: self.controller.session_id().unwrap(),
            episode_id,
        };
        self.wait_for_data(&reference);
        reference
    }

    pub fn stored(&self, reference: &EpisodeRef) -> Episode {
        self.storage
            .get_episode(&reference.study_id, &reference.session_id, &reference.episode_id)
            .unwrap()
            .unwrap()
    }

    /// Waits for the background copy of the episode data to be readable.
    pub fn wait_for_data(&self, reference: &EpisodeRef) {
        let episode = self.stored(reference);
        let path = episode.storage.as_ref().unwrap().path();
        let start = Instant::now();
        while JsonEpisode::load(path).is_err() {
            assert!(start.elapsed() < Duration::from_secs(5), "{} never appeared", path.display());
            thread::sleep(Duration::from_millis(10));
        }
    }
}

pub fn wait_for_file(path: &Path) {
    let start = Instant::now();
    while !path.exists() {
        assert!(start.elapsed() < Duration::from_secs(5), "{} never appeared", path.display());
        thread::sleep(Duration::from_millis(10));
    }
}

/// Collects responses for `duration`.
pub fn collect_for(responses: &Receiver<Response>, duration: Duration) -> Vec<Response> {
    let deadline = Instant::now() + duration;
    let mut out = Vec::new();
    while let Ok(response) = responses.recv_deadline(deadline) {
        out.push(response);
    }
    out
}

pub fn error_message(responses: &[Response]) -> Option<&str> {
    responses.iter().find_map(|r| match r {
        Response::Error { message } => Some(message.as_str()),
        _ => None,
    })
}
