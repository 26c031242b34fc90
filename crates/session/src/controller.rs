use crate::artifacts::{spawn_file_copy, spawn_relocation, VideoRecorder, VIDEO_FILE};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::export::export_episodes;
use crate::listing::{episode_metadata, VIDEO_FILE_KEY};
use crate::request::{Data, DownloadRequest, GamepadInput, NamedImage, Request, Response};
use crate::sink::ResponseSink;
use crate::timer::{control_channel, is_idle, next_tick, StepTimer, Tick, TickHandler, TimerHandle};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use environment::{
    encode_jpeg, encode_png, Action, Controller, Environment, EnvironmentFactory, EnvironmentSpec,
    Image, Keys, Metadata, Quality, TimeStep, UserInput,
};
use episode::policy::{
    agent_id, can_access_study, can_delete_episode, can_update_study, delete_episode_storage,
    env_spec_by_id, metadata_key, public_episode_id, validate_study_spec,
};
use episode::{
    Episode, EpisodeRef, EpisodeState, EpisodeStorageFactory, EpisodeWriter, Replay, Session,
    SessionState, StaticReplay, StepData, StorageReplay, StorageSpec, Storage, StudySpec,
    StudyState, User, METADATA_IMAGE, METADATA_INFO, METADATA_KEYS,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{error, info, warn};

/// Toggles the pause state.
pub const PAUSE_KEY: &str = "/";
/// Ends the episode early and asks the operator what to do with it.
pub const RESET_KEY: &str = "Return";
/// Study id of replays read directly from an episode file.
pub const FILE_STUDY_ID: &str = "file";

/// Canonical name of a key reported by the browser.
fn canonical_key(key: &str) -> &str {
    match key {
        "ArrowUp" => "Up",
        "ArrowDown" => "Down",
        "ArrowLeft" => "Left",
        "ArrowRight" => "Right",
        "Enter" => "Return",
        other => other,
    }
}

/// Merges the keyboard and gamepad input of an action request. Pressed keys
/// have the value 1; gamepad buttons and axes become `Button{i}` and
/// `Axis{i}` keys with their analog values.
#[must_use]
pub fn action_keys(keys: &[String], gamepad: &GamepadInput) -> Keys {
    let mut out: Keys = keys.iter().map(|k| (canonical_key(k).to_string(), 1.0)).collect();
    for (index, value) in &gamepad.buttons {
        out.insert(format!("Button{index}"), *value);
    }
    for (index, value) in &gamepad.axes {
        out.insert(format!("Axis{index}"), *value);
    }
    out
}

/// The collaborators of a [`SessionController`].
#[derive(Clone)]
pub struct SessionContext {
    pub storage: Arc<dyn Storage>,
    pub env_factory: Arc<dyn EnvironmentFactory>,
    pub episode_factory: Arc<dyn EpisodeStorageFactory>,
    pub sink: Arc<dyn ResponseSink>,
}

struct ActiveSession {
    record: Session,
    path: PathBuf,
}

struct ActiveEnvironment {
    env: Box<dyn Environment>,
    spec: EnvironmentSpec,
}

/// The episode being recorded.
struct Recording {
    episode: Episode,
    steps: usize,
    total_reward: f64,
    /// Stored with the episode data when it ends.
    metadata: Metadata,
    dir: TempDir,
    writer: Box<dyn EpisodeWriter>,
    video: Option<VideoRecorder>,
}

struct State {
    study: Option<StudySpec>,
    session: Option<ActiveSession>,
    env: Option<ActiveEnvironment>,
    recording: Option<Recording>,
    run_id: u64,
    /// Episodes started in the current run.
    episodes_started: u64,
    paused: bool,
    sync: bool,
    closed: bool,
    /// True while the timer has a pending step.
    scheduled: bool,
    fps: f64,
    quality: Quality,
    input: UserInput,
    last_action: Instant,
    /// JPEG of the last rendered frame.
    frame: Option<Vec<u8>>,
    replay: Option<Box<dyn Replay>>,
}

struct Shared {
    user: User,
    config: SessionConfig,
    ctx: SessionContext,
    timer: TimerHandle,
    state: Mutex<State>,
}

/// Mediates between one operator and one live environment.
///
/// Requests are handled by [`handle_request`](SessionController::handle_request).
/// Asynchronous environments are additionally stepped by a timer thread;
/// every change of the environment, from either side, happens under one
/// lock.
pub struct SessionController {
    shared: Arc<Shared>,
    _timer: StepTimer,
}

impl SessionController {
    /// Creates the controller and sends the configuration and the studies of
    /// the user to the operator.
    pub fn new(
        user: User,
        config: SessionConfig,
        ctx: SessionContext,
    ) -> Result<Self, SessionError> {
        let (handle, control) = control_channel();
        let state = State {
            study: None,
            session: None,
            env: None,
            recording: None,
            run_id: 0,
            episodes_started: 0,
            paused: false,
            sync: false,
            closed: false,
            scheduled: false,
            fps: config.fps,
            quality: Quality::default(),
            input: UserInput::default(),
            last_action: Instant::now(),
            frame: None,
            replay: None,
        };
        let shared = Arc::new(Shared {
            user,
            config,
            ctx,
            timer: handle.clone(),
            state: Mutex::new(state),
        });
        let handler: Weak<dyn TickHandler> = Arc::downgrade(&shared) as Weak<dyn TickHandler>;
        let timer = StepTimer::spawn(handle, control, handler)?;
        let controller = Self { shared, _timer: timer };
        controller.shared.send_config()?;
        controller.handle_request(Request::SetStudies);
        Ok(controller)
    }

    /// Handles one operator request. Failures are logged and reported to
    /// the operator as an error response; they never end the session.
    pub fn handle_request(&self, request: Request) {
        let result = match request {
            Request::DownloadEpisodes(download) => self.shared.download_episodes(&download),
            other => {
                let mut state = self.shared.state.lock();
                let result = self.shared.dispatch(&mut state, other);
                if let Err(e) = &result {
                    if e.is_fatal() {
                        self.shared.drop_environment(&mut state);
                    }
                }
                result
            }
        };
        if let Err(e) = result {
            error!("Request failed: {e}");
            self.shared.send(Response::Error { message: e.operator_message() });
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Id of the current session, if a study is selected.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.state.lock().session.as_ref().map(|s| s.record.id.clone())
    }

    #[must_use]
    pub fn session_path(&self) -> Option<PathBuf> {
        self.shared.state.lock().session.as_ref().map(|s| s.path.clone())
    }

    /// Keys of the last operator input.
    #[must_use]
    pub fn keys(&self) -> Keys {
        self.shared.state.lock().input.keys.clone()
    }

    /// The episode being recorded.
    #[must_use]
    pub fn current_episode(&self) -> Option<Episode> {
        self.shared.state.lock().recording.as_ref().map(|r| r.episode.clone())
    }

    #[must_use]
    pub fn fps(&self) -> f64 {
        self.shared.state.lock().fps
    }

    #[must_use]
    pub fn quality(&self) -> Quality {
        self.shared.state.lock().quality
    }

    /// Ends the session: the environment is closed and the open episode is
    /// finalised. Later calls do nothing.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Err(e) = self.shared.close_session(&mut state) {
            error!("Failed to close the session: {e}");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.close();
    }
}

impl TickHandler for Shared {
    fn tick(&self) -> Tick {
        let mut state = self.state.lock();
        state.scheduled = false;
        if state.env.is_none() || state.closed || state.paused || state.sync {
            return Tick::Stop;
        }
        let start = Instant::now();
        if is_idle(start.duration_since(state.last_action), self.config.idle_timeout()) {
            info!("No input for {:?}, pausing.", self.config.idle_timeout());
            self.pause(&mut state, true);
            return Tick::Stop;
        }
        if let Err(e) = self.step(&mut state) {
            error!("Asynchronous step failed: {e}");
            if e.is_fatal() {
                self.drop_environment(&mut state);
            } else {
                self.pause(&mut state, true);
            }
            self.send(Response::Error { message: e.operator_message() });
            return Tick::Stop;
        }
        let tick = next_tick(start.elapsed(), state.fps, state.paused);
        state.scheduled = matches!(tick, Tick::Reschedule(_));
        tick
    }
}

impl Shared {
    fn send(&self, response: Response) -> bool {
        self.ctx.sink.send(response)
    }

    fn send_config(&self) -> Result<(), SessionError> {
        let config = serde_json::to_value(&self.config).map_err(episode::EpisodeError::from)?;
        self.send(Response::Config { config });
        Ok(())
    }

    fn dispatch(&self, state: &mut State, request: Request) -> Result<(), SessionError> {
        match request {
            Request::SetStudies => {
                let studies = self.ctx.storage.get_studies(None, Some(&self.user.email))?;
                self.send(Response::SetStudies { studies });
            }
            Request::SelectStudy { study_id } => self.select_study(state, &study_id)?,
            Request::SaveStudy { study } => self.save_study(study)?,
            Request::EnableStudy { study_id, enable } => self.enable_study(&study_id, enable)?,
            Request::SelectEnvironment { env_id } => self.select_environment(state, &env_id)?,
            Request::Action { keys, gamepad } => {
                if state.env.is_some() {
                    self.handle_action(state, &keys, &gamepad)?;
                }
            }
            Request::SaveEpisode { accept, mark_as_completed } => {
                let recording = state
                    .recording
                    .as_mut()
                    .ok_or_else(|| SessionError::invalid("No episode is being recorded."))?;
                recording.episode.state = match (accept, mark_as_completed) {
                    (false, _) => EpisodeState::Rejected,
                    (true, true) => EpisodeState::Completed,
                    (true, false) => EpisodeState::Cancelled,
                };
                self.start_episode(state)?;
                self.send_step(state, 0.0);
            }
            Request::DeleteEpisode { reference } => self.delete_episode(&reference)?,
            Request::SetCamera { index } => self.set_camera(state, index)?,
            Request::SetFps { fps } => {
                if !fps.is_finite() || fps <= 0.0 {
                    return Err(SessionError::invalid("Invalid frame rate."));
                }
                state.fps = fps;
            }
            Request::SetQuality { quality } => {
                state.quality = quality;
                if state.env.is_some() && (state.paused || state.sync) {
                    self.render(state)?;
                    self.send_step(state, 0.0);
                }
            }
            Request::ReplayEpisode { reference } => self.replay_episode(state, &reference)?,
            Request::ReplayStep { index } => self.replay_step(state, index)?,
            Request::AddEpisodeTag { tag } => {
                let success = match state.replay.as_mut() {
                    Some(replay) => replay.add_episode_tag(&tag)?,
                    None => false,
                };
                self.send(Response::AddEpisodeTag { tag, success });
            }
            Request::RemoveEpisodeTag { tag } => {
                let success = match state.replay.as_mut() {
                    Some(replay) => replay.remove_episode_tag(&tag)?,
                    None => false,
                };
                self.send(Response::RemoveEpisodeTag { tag, success });
            }
            Request::UpdateReplayEpisode { notes } => {
                let success = match state.replay.as_mut() {
                    Some(replay) => replay.update_episode(&notes)?,
                    None => false,
                };
                self.send(Response::UpdateReplayEpisode { success });
            }
            Request::AddStepTag { index, tag } => {
                let success = match state.replay.as_mut() {
                    Some(replay) => replay.add_step_tag(index, &tag)?,
                    None => false,
                };
                self.send(Response::AddStepTag { index, tag, success });
            }
            Request::RemoveStepTag { index, tag } => {
                let success = match state.replay.as_mut() {
                    Some(replay) => replay.remove_step_tag(index, &tag)?,
                    None => false,
                };
                self.send(Response::RemoveStepTag { index, tag, success });
            }
            Request::DownloadEpisodes(download) => self.download_episodes(&download)?,
        }
        Ok(())
    }

    // Studies and sessions.

    fn select_study(&self, state: &mut State, study_id: &str) -> Result<(), SessionError> {
        let study = self
            .ctx
            .storage
            .get_study(study_id)?
            .ok_or_else(|| SessionError::invalid("Missing study."))?;
        if !can_access_study(&study, &self.user.email) {
            return Err(SessionError::invalid("You cannot access this study."));
        }
        // The open episode is reported against the study it was recorded in.
        self.close_session(state)?;
        state.study = Some(study.clone());
        self.create_session(state, &study)?;
        self.send(Response::SelectStudy { study: study.clone() });
        self.send_episodes(&study)
    }

    fn create_session(&self, state: &mut State, study: &StudySpec) -> Result<(), SessionError> {
        self.close_session(state)?;
        let record = Session {
            id: uuid::Uuid::new_v4().simple().to_string(),
            study_id: study.id.clone(),
            user: self.user.clone(),
            start_time: Some(Utc::now()),
            end_time: None,
            state: SessionState::Valid,
        };
        let path = self.config.base_log_dir.join(&study.id).join(&record.id);
        fs::create_dir_all(&path)?;
        self.ctx.storage.create_session(&record)?;
        info!(session = %record.id, study = %study.id, "Started session");
        state.session = Some(ActiveSession { record, path });
        Ok(())
    }

    fn close_session(&self, state: &mut State) -> Result<(), SessionError> {
        let Some(mut session) = state.session.take() else {
            return Ok(());
        };
        session.record.end_time = Some(Utc::now());
        info!(session = %session.record.id, "End of session");
        self.close_environment(state);
        // The open episode still needs the session directory.
        let finalized = self.finalize_episode(state, &session.path);
        self.ctx.storage.update_session(&session.record)?;
        finalized
    }

    fn save_study(&self, mut study: StudySpec) -> Result<(), SessionError> {
        if study.id.is_empty() {
            study.creator = self.user.clone();
            validate_study_spec(&study)?;
            self.ctx.storage.create_study(study)?;
        } else {
            let existing = self
                .ctx
                .storage
                .get_study(&study.id)?
                .ok_or_else(|| SessionError::invalid("Missing study."))?;
            if !can_update_study(&existing, &self.user.email) {
                return Err(SessionError::invalid("You cannot modify this study."));
            }
            study.creator = existing.creator;
            study.creation_time = existing.creation_time;
            study.state = existing.state;
            validate_study_spec(&study)?;
            self.ctx.storage.update_study(&study)?;
        }
        self.send(Response::SaveStudy);
        Ok(())
    }

    fn enable_study(&self, study_id: &str, enable: bool) -> Result<(), SessionError> {
        let study = self
            .ctx
            .storage
            .get_study(study_id)?
            .ok_or_else(|| SessionError::invalid("Missing study."))?;
        if !can_update_study(&study, &self.user.email) {
            return Err(SessionError::invalid("You cannot modify this study."));
        }
        let state = if enable { StudyState::Enabled } else { StudyState::Disabled };
        self.ctx.storage.update_study_state(study_id, state)?;
        self.send(Response::EnableStudy { study_id: study_id.to_string(), enabled: enable });
        Ok(())
    }

    /// Sends the episodes of the study: all of them to its creator, only
    /// their own to everybody else.
    fn send_episodes(&self, study: &StudySpec) -> Result<(), SessionError> {
        let email = (study.creator.email != self.user.email).then_some(self.user.email.as_str());
        let episodes = self.ctx.storage.get_episodes(&study.id, email)?;
        info!(
            "Loaded {} episode(s) for {} in study {}.",
            episodes.len(),
            self.user.email,
            study.id
        );
        let episodes = episodes
            .iter()
            .filter_map(|episode| {
                let env = env_spec_by_id(study, &episode.environment_id)?;
                Some(episode_metadata(study, Some(env), episode, &self.user.email, self.sink()))
            })
            .collect();
        self.send(Response::Episodes { episodes });
        Ok(())
    }

    fn sink(&self) -> &dyn ResponseSink {
        self.ctx.sink.as_ref()
    }

    fn delete_episode(&self, reference: &EpisodeRef) -> Result<(), SessionError> {
        let episode = self
            .ctx
            .storage
            .get_episode(&reference.study_id, &reference.session_id, &reference.episode_id)?
            .ok_or_else(|| SessionError::invalid("Missing episode."))?;
        if !can_delete_episode(&episode, &self.user.email) {
            return Err(SessionError::invalid("You cannot delete this episode."));
        }
        let success = self.ctx.storage.delete_episode(
            &reference.study_id,
            &reference.session_id,
            &reference.episode_id,
        )?;
        if success {
            delete_episode_storage(&episode);
        }
        self.send(Response::DeleteEpisode { reference: reference.clone(), success });
        Ok(())
    }

    // Environment and recording.

    fn select_environment(&self, state: &mut State, env_id: &str) -> Result<(), SessionError> {
        let study = state
            .study
            .clone()
            .ok_or_else(|| SessionError::invalid("No study is selected."))?;
        let spec = env_spec_by_id(&study, env_id)
            .cloned()
            .ok_or_else(|| SessionError::invalid("Missing environment."))?;
        if let Some(session_path) = state.session.as_ref().map(|s| s.path.clone()) {
            self.finalize_episode(state, &session_path)?;
        }
        self.close_environment(state);

        let env = self.ctx.env_factory.create(&spec)?;
        // A new environment starts a new run of episodes.
        state.run_id += 1;
        state.sync = spec.sync;
        state.episodes_started = 0;
        state.frame = None;
        state.env = Some(ActiveEnvironment { env, spec: spec.clone() });
        self.start_episode(state)?;
        self.send_step(state, 0.0);
        state.closed = false;
        state.last_action = Instant::now();
        self.send(Response::SelectEnvironment { study_id: study.id, env: spec });
        Ok(())
    }

    fn close_environment(&self, state: &mut State) {
        self.cancel_timer(state);
        if let Some(mut active) = state.env.take() {
            if let Err(e) = active.env.close() {
                warn!(env = %active.spec.id, "Failed to close the environment: {e}");
            }
        }
    }

    /// Forgets an environment that can no longer be used. The operator has
    /// to select an environment again.
    fn drop_environment(&self, state: &mut State) {
        warn!("Dropping the environment after a fatal failure");
        self.cancel_timer(state);
        state.env = None;
        if let Some(path) = state.session.as_ref().map(|s| s.path.clone()) {
            if let Err(e) = self.finalize_episode(state, &path) {
                error!("Failed to save the episode: {e}");
            }
        }
        state.recording = None;
    }

    /// Finalises the open episode and starts a new one.
    fn start_episode(&self, state: &mut State) -> Result<(), SessionError> {
        let session = state
            .session
            .as_ref()
            .map(|s| (s.record.id.clone(), s.path.clone()))
            .ok_or_else(|| SessionError::invalid("No study is selected."))?;
        let study_id = state
            .study
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or_else(|| SessionError::invalid("No study is selected."))?;
        self.finalize_episode(state, &session.1)?;

        let active = state
            .env
            .as_mut()
            .ok_or_else(|| SessionError::invalid("No environment is selected."))?;
        let index = state.episodes_started;
        state.episodes_started += 1;
        let episode_id = format!("{}.{index}", state.run_id);
        let env_metadata = active.env.metadata()?;
        let episode = Episode {
            id: episode_id.clone(),
            study_id: study_id.clone(),
            environment_id: active.spec.id.clone(),
            user: self.user.clone(),
            session_id: session.0,
            metadata: env_metadata.clone(),
            start_time: Some(Utc::now()),
            ..Episode::default()
        };
        let mut metadata = Metadata::new();
        metadata.insert("agent_id".into(), json!(agent_id(&study_id, &self.user.email)));
        metadata.insert("episode_id".into(), json!(public_episode_id(&study_id, &episode_id)));
        metadata.insert(metadata_key("env_id"), json!(active.spec.id));
        metadata.insert(metadata_key("study_id"), json!(study_id));

        // Episodes are recorded to a temporary directory and moved once
        // they end.
        let dir = tempfile::tempdir()?;
        let mut writer = self.ctx.episode_factory.create_writer(
            &self.config.episode_storage_kind,
            dir.path(),
            active.env.specs()?,
            env_metadata,
        )?;
        writer.start_episode()?;
        let timestep = active.env.reset()?;
        let video = if self.config.record_videos { Some(VideoRecorder::new()?) } else { None };
        state.input = UserInput::default();
        state.recording = Some(Recording {
            episode,
            steps: 0,
            total_reward: 0.0,
            metadata,
            dir,
            writer,
            video,
        });
        self.record_step(state, timestep, Value::Null)?;
        // Asynchronous environments wait for the operator to get ready.
        let sync = state.sync;
        self.pause(state, !sync);
        Ok(())
    }

    /// Renders the current frame with the current quality.
    fn render(&self, state: &mut State) -> Result<(), SessionError> {
        let active = state
            .env
            .as_mut()
            .ok_or_else(|| SessionError::invalid("No environment is selected."))?;
        let image = active.env.render()?;
        state.frame = Some(encode_jpeg(&image, state.quality)?);
        Ok(())
    }

    fn record_step(
        &self,
        state: &mut State,
        timestep: TimeStep,
        action: Action,
    ) -> Result<(), SessionError> {
        self.render(state)?;
        let mut custom = serde_json::Map::new();
        custom.insert(METADATA_KEYS.into(), json!(state.input.keys));
        if let Some(frame) = &state.frame {
            custom.insert(METADATA_IMAGE.into(), json!(BASE64.encode(frame)));
        }
        if let Some(info) = state.env.as_ref().and_then(|a| a.env.step_info()) {
            custom.insert(METADATA_INFO.into(), info);
        }
        let recording = state
            .recording
            .as_mut()
            .ok_or_else(|| SessionError::invalid("No episode is being recorded."))?;
        recording.writer.record_step(StepData::new(timestep, action, Value::Object(custom)))?;
        Ok(())
    }

    fn handle_action(
        &self,
        state: &mut State,
        keys: &[String],
        gamepad: &GamepadInput,
    ) -> Result<(), SessionError> {
        let keys = action_keys(keys, gamepad);
        state.last_action = Instant::now();
        // Released keys do not step synchronous environments.
        if state.sync && keys.is_empty() {
            return Ok(());
        }
        if !gamepad.id.is_empty() && gamepad.is_active() {
            if let Some(recording) = state.recording.as_mut() {
                recording.episode.controller_id = Some(gamepad.id.clone());
            }
        }
        let controller = if gamepad.id.contains("SpaceMouse") {
            Controller::SpaceMouse
        } else {
            Controller::Default
        };
        state.input = UserInput::new(keys, controller);
        if state.input.keys.contains_key(PAUSE_KEY) {
            let paused = !state.paused;
            self.pause(state, paused);
        } else if state.input.keys.contains_key(RESET_KEY) {
            if let Some(recording) = state.recording.as_mut() {
                recording.episode.state = EpisodeState::Cancelled;
            }
            self.confirm_save(state);
        } else if state.sync {
            self.step(state)?;
        }
        Ok(())
    }

    /// Steps the environment with the current input unless it is paused.
    fn step(&self, state: &mut State) -> Result<(), SessionError> {
        if state.paused {
            return Ok(());
        }
        let active = state
            .env
            .as_mut()
            .ok_or_else(|| SessionError::invalid("No environment is selected."))?;
        let action = match active.env.map_input(&state.input)? {
            Some(action) => action,
            None if state.sync => return Ok(()),
            None => Value::Null,
        };
        let timestep = active.env.step(&action)?;
        let reward = timestep.reward.unwrap_or(0.0);
        let last = timestep.last();
        self.record_step(state, timestep, action)?;
        if let Some(recording) = state.recording.as_mut() {
            recording.steps += 1;
            recording.total_reward += reward;
        }
        self.send_step(state, reward);
        if last {
            if let Some(recording) = state.recording.as_mut() {
                recording.episode.state = EpisodeState::Completed;
            }
            self.confirm_save(state);
        }
        Ok(())
    }

    fn send_step(&self, state: &mut State, reward: f64) {
        let episode_steps = state.recording.as_ref().map_or(0, |r| r.steps);
        self.send(Response::Step {
            image: state.frame.as_ref().map(|f| BASE64.encode(f)),
            episode_index: state.episodes_started,
            episode_steps,
            reward,
        });
        if let (Some(frame), Some(recording)) = (&state.frame, state.recording.as_mut()) {
            if let Some(video) = recording.video.as_mut() {
                if let Err(e) = video.write_frame(frame) {
                    warn!("Failed to record a video frame: {e}");
                }
            }
        }
    }

    fn pause(&self, state: &mut State, paused: bool) {
        state.paused = paused;
        if !state.sync {
            if paused {
                self.cancel_timer(state);
            } else if !state.scheduled {
                // The first step runs right away.
                state.scheduled = true;
                self.timer.schedule(Duration::ZERO);
            }
        }
        self.send(Response::Pause { paused });
    }

    fn cancel_timer(&self, state: &mut State) {
        if state.scheduled {
            info!("Cancelling the timer.");
            state.scheduled = false;
            self.timer.cancel();
        }
    }

    /// Pauses and asks the operator whether to keep the episode.
    fn confirm_save(&self, state: &mut State) {
        self.pause(state, true);
        let mark_as_completed = state
            .recording
            .as_ref()
            .is_some_and(|r| r.episode.state == EpisodeState::Completed);
        self.send(Response::ConfirmSave { mark_as_completed });
    }

    /// Ends the open episode, if any, and stores it.
    ///
    /// Episodes without a disposition are abandoned; abandoned episodes
    /// without steps are dropped. The data is moved to
    /// `{session}/[ignored/]{env_id}/{episode_id}` in the background, where
    /// the `ignored` level holds every episode that is not completed.
    fn finalize_episode(&self, state: &mut State, session_path: &Path) -> Result<(), SessionError> {
        let Some(mut recording) = state.recording.take() else {
            return Ok(());
        };
        let spec = recording.writer.end_episode(recording.metadata.clone())?;
        recording.writer.close()?;
        let episode = &mut recording.episode;
        if episode.state == EpisodeState::Active {
            if recording.steps == 0 {
                info!("Ignoring empty abandoned episode.");
                return Ok(());
            }
            episode.state = EpisodeState::Abandoned;
        }
        let mut final_path = session_path.to_path_buf();
        if episode.state != EpisodeState::Completed {
            final_path.push("ignored");
        }
        final_path.push(&episode.environment_id);
        final_path.push(&episode.id);
        fs::create_dir_all(&final_path)?;

        episode.storage = Some(spec.relocated(&final_path));
        episode.num_steps = recording.steps;
        episode.total_reward = recording.total_reward;
        episode.end_time = Some(Utc::now());
        spawn_relocation(recording.dir, final_path.clone());
        if let Some(video) = recording.video.take() {
            let file = final_path.join(VIDEO_FILE);
            spawn_file_copy(video.finish()?, file.clone());
            episode
                .metadata
                .insert(VIDEO_FILE_KEY.into(), json!(file.to_string_lossy()));
        }
        info!(
            episode = %episode.id,
            state = ?episode.state,
            steps = episode.num_steps,
            "End of episode"
        );
        if let Some(study) = &state.study {
            let env = env_spec_by_id(study, &episode.environment_id);
            let metadata = episode_metadata(study, env, episode, &self.user.email, self.sink());
            self.send(Response::SaveEpisode { episode: Box::new(metadata) });
        }
        self.ctx.storage.create_episode(episode)?;
        Ok(())
    }

    fn set_camera(&self, state: &mut State, index: u32) -> Result<(), SessionError> {
        let Some(active) = state.env.as_mut() else {
            return Ok(());
        };
        let Some(camera) = active.env.set_camera(index)? else {
            return Ok(());
        };
        self.send(Response::SetCamera { index: camera.index, name: camera.name });
        // Running asynchronous environments show the new camera with the
        // next step.
        if state.paused || state.sync {
            self.render(state)?;
            self.send_step(state, 0.0);
        }
        Ok(())
    }

    // Replay.

    fn replay_episode(&self, state: &mut State, reference: &EpisodeRef) -> Result<(), SessionError> {
        let replay: Box<dyn Replay> = if reference.study_id == FILE_STUDY_ID {
            let path = Path::new(&reference.session_id).join(&reference.episode_id);
            let reader = self.ctx.episode_factory.create_reader(&StorageSpec::Json { path })?;
            Box::new(StaticReplay::new(
                reader.steps().to_vec(),
                &reference.session_id,
                &reference.episode_id,
                None,
            ))
        } else {
            Box::new(StorageReplay::new(
                Arc::clone(&self.ctx.storage),
                self.ctx.episode_factory.as_ref(),
                &reference.study_id,
                &reference.session_id,
                &reference.episode_id,
            )?)
        };
        let episode = replay.episode();
        let metadata = episode_metadata(
            replay.study_spec(),
            replay.env_spec(),
            episode,
            &self.user.email,
            self.sink(),
        );
        // The first step has no reward.
        let step_rewards = (0..=episode.num_steps)
            .map(|i| replay.step(i).and_then(|s| s.timestep.reward).unwrap_or(0.0))
            .collect();
        state.replay = Some(replay);
        self.send(Response::ReplayEpisode { episode: Box::new(metadata), step_rewards });
        Ok(())
    }

    fn replay_step(&self, state: &mut State, index: usize) -> Result<(), SessionError> {
        let Some(replay) = state.replay.as_ref() else {
            return Ok(());
        };
        let Some(step) = replay.step(index) else {
            return Ok(());
        };
        let tags = replay
            .episode()
            .step_metadata
            .get(&index)
            .map(|m| m.tags.iter().map(|t| t.label.clone()).collect())
            .unwrap_or_default();
        let response = Response::ReplayStep {
            index,
            image: step.custom_data.get(METADATA_IMAGE).cloned(),
            keys: step.custom_data.get(METADATA_KEYS).cloned(),
            reward: step.timestep.reward,
            observation: observation_data(&step.timestep.observation)?,
            action: Data { images: Vec::new(), json_encoded: Some(step.action.to_string()) },
            tags,
        };
        self.send(response);
        Ok(())
    }

    // Export.

    fn download_episodes(&self, request: &DownloadRequest) -> Result<(), SessionError> {
        let location = export_episodes(
            self.ctx.storage.as_ref(),
            &self.ctx.episode_factory,
            &self.config,
            request,
            &mut |progress| {
                self.send(Response::DownloadEpisodes { progress, url: None });
            },
        )?;
        self.send(Response::DownloadEpisodes {
            progress: 100.0,
            url: self.ctx.sink.url_for_path(&location),
        });
        Ok(())
    }
}

fn png_image(name: Option<String>, image: &Image) -> Result<NamedImage, SessionError> {
    Ok(NamedImage { name, image: BASE64.encode(encode_png(image)?) })
}

/// Image-like observations, and image-like entries of object observations,
/// are sent as PNG images; the rest as JSON with sorted keys.
fn observation_data(observation: &Value) -> Result<Data, SessionError> {
    let mut data = Data::default();
    if let Some(image) = Image::from_value(observation) {
        data.images.push(png_image(None, &image)?);
        return Ok(data);
    }
    match observation {
        Value::Object(map) => {
            let mut rest = serde_json::Map::new();
            for (key, value) in map {
                match Image::from_value(value) {
                    Some(image) => data.images.push(png_image(Some(key.clone()), &image)?),
                    None => {
                        rest.insert(key.clone(), value.clone());
                    }
                }
            }
            if !rest.is_empty() {
                data.json_encoded = Some(Value::Object(rest).to_string());
            }
        }
        other => data.json_encoded = Some(other.to_string()),
    }
    Ok(data)
}
