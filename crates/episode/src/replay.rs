use crate::error::EpisodeError;
use crate::io::{EpisodeStorageFactory, StepData};
use crate::model::{Episode, EpisodeState, StudySpec, Tag};
use crate::policy::env_spec_by_id;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use environment::EnvironmentSpec;
use std::sync::Arc;

/// An episode opened for replay, together with its tag and note editing.
pub trait Replay: Send {
    fn episode(&self) -> &Episode;

    fn study_spec(&self) -> &StudySpec;

    /// `None` for replays that do not come from a study.
    fn env_spec(&self) -> Option<&EnvironmentSpec>;

    fn steps(&self) -> &[StepData];

    fn step(&self, index: usize) -> Option<&StepData> {
        self.steps().get(index)
    }

    /// Returns false if the episode already has the tag.
    fn add_episode_tag(&mut self, label: &str) -> Result<bool, EpisodeError>;

    /// Removes every tag with the label; false if there was none.
    fn remove_episode_tag(&mut self, label: &str) -> Result<bool, EpisodeError>;

    /// Replaces the notes of the episode; empty notes clear them.
    fn update_episode(&mut self, notes: &str) -> Result<bool, EpisodeError>;

    fn add_step_tag(&mut self, index: usize, label: &str) -> Result<bool, EpisodeError>;

    fn remove_step_tag(&mut self, index: usize, label: &str) -> Result<bool, EpisodeError>;
}

fn add_tag(tags: &mut Vec<Tag>, label: &str) -> bool {
    if tags.iter().any(|t| t.label == label) {
        return false;
    }
    tags.push(Tag::new(label));
    true
}

fn remove_tag(tags: &mut Vec<Tag>, label: &str) -> bool {
    let count = tags.len();
    tags.retain(|t| t.label != label);
    tags.len() != count
}

/// Replays an episode from the study storage. Edits are written back through
/// [`Storage::atomic_update_episode`].
pub struct StorageReplay {
    storage: Arc<dyn Storage>,
    study_spec: StudySpec,
    env_spec: EnvironmentSpec,
    episode: Episode,
    steps: Vec<StepData>,
}

impl StorageReplay {
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: &dyn EpisodeStorageFactory,
        study_id: &str,
        session_id: &str,
        episode_id: &str,
    ) -> Result<Self, EpisodeError> {
        let episode = storage
            .get_episode(study_id, session_id, episode_id)?
            .ok_or_else(|| EpisodeError::Missing("Missing episode.".into()))?;
        let study_spec = storage
            .get_study(study_id)?
            .ok_or_else(|| EpisodeError::Missing("Missing study.".into()))?;
        let env_spec = env_spec_by_id(&study_spec, &episode.environment_id)
            .cloned()
            .ok_or_else(|| EpisodeError::Missing("Missing environment.".into()))?;
        let spec = episode
            .storage
            .as_ref()
            .ok_or_else(|| EpisodeError::Missing("Missing episode data.".into()))?;
        let steps = factory.create_reader(spec)?.steps().to_vec();
        Ok(Self { storage, study_spec, env_spec, episode, steps })
    }

    fn check_step(&self, index: usize) -> Result<(), EpisodeError> {
        if index >= self.steps.len() {
            return Err(EpisodeError::Invalid("Invalid step.".into()));
        }
        Ok(())
    }

    /// Applies `update` atomically and keeps the stored version on success.
    fn atomic_update(
        &mut self,
        mut update: impl FnMut(&mut Episode) -> bool,
    ) -> Result<bool, EpisodeError> {
        let mut updated = None;
        let mut callback = |episode: &mut Episode| {
            let result = update(episode);
            if result {
                updated = Some(episode.clone());
            }
            result
        };
        let result = self.storage.atomic_update_episode(
            &self.episode.study_id,
            &self.episode.session_id,
            &self.episode.id,
            &mut callback,
        )?;
        if let (true, Some(episode)) = (result, updated) {
            self.episode = episode;
        }
        Ok(result)
    }
}

impl Replay for StorageReplay {
    fn episode(&self) -> &Episode {
        &self.episode
    }

    fn study_spec(&self) -> &StudySpec {
        &self.study_spec
    }

    fn env_spec(&self) -> Option<&EnvironmentSpec> {
        Some(&self.env_spec)
    }

    fn steps(&self) -> &[StepData] {
        &self.steps
    }

    fn add_episode_tag(&mut self, label: &str) -> Result<bool, EpisodeError> {
        self.atomic_update(|episode| add_tag(&mut episode.tags, label))
    }

    fn remove_episode_tag(&mut self, label: &str) -> Result<bool, EpisodeError> {
        self.atomic_update(|episode| remove_tag(&mut episode.tags, label))
    }

    fn update_episode(&mut self, notes: &str) -> Result<bool, EpisodeError> {
        self.atomic_update(|episode| {
            episode.notes = notes.to_string();
            true
        })
    }

    fn add_step_tag(&mut self, index: usize, label: &str) -> Result<bool, EpisodeError> {
        self.check_step(index)?;
        self.atomic_update(|episode| {
            add_tag(&mut episode.step_metadata.entry(index).or_default().tags, label)
        })
    }

    fn remove_step_tag(&mut self, index: usize, label: &str) -> Result<bool, EpisodeError> {
        self.check_step(index)?;
        self.atomic_update(|episode| {
            let Some(metadata) = episode.step_metadata.get_mut(&index) else {
                return false;
            };
            let removed = remove_tag(&mut metadata.tags, label);
            if metadata.tags.is_empty() {
                episode.step_metadata.remove(&index);
            }
            removed
        })
    }
}

/// Replays a list of steps that does not belong to a study, e.g. an episode
/// file. Nothing can be edited.
pub struct StaticReplay {
    study_spec: StudySpec,
    episode: Episode,
    steps: Vec<StepData>,
}

const STATIC_UNSUPPORTED: &str = "Not supported for file based replays.";

impl StaticReplay {
    #[must_use]
    pub fn new(
        steps: Vec<StepData>,
        session_id: &str,
        episode_id: &str,
        time: Option<DateTime<Utc>>,
    ) -> Self {
        let study_spec =
            StudySpec { id: "static".into(), name: "Static".into(), ..StudySpec::default() };
        let time = time.unwrap_or_else(Utc::now);
        let episode = Episode {
            id: episode_id.to_string(),
            study_id: study_spec.id.clone(),
            environment_id: "static".into(),
            session_id: session_id.to_string(),
            state: EpisodeState::Completed,
            num_steps: steps.len().saturating_sub(1),
            total_reward: steps.iter().map(StepData::reward).sum(),
            start_time: Some(time),
            end_time: Some(time),
            ..Episode::default()
        };
        Self { study_spec, episode, steps }
    }
}

impl Replay for StaticReplay {
    fn episode(&self) -> &Episode {
        &self.episode
    }

    fn study_spec(&self) -> &StudySpec {
        &self.study_spec
    }

    fn env_spec(&self) -> Option<&EnvironmentSpec> {
        None
    }

    fn steps(&self) -> &[StepData] {
        &self.steps
    }

    fn add_episode_tag(&mut self, _label: &str) -> Result<bool, EpisodeError> {
        Err(EpisodeError::Unsupported(STATIC_UNSUPPORTED.into()))
    }

    fn remove_episode_tag(&mut self, _label: &str) -> Result<bool, EpisodeError> {
        Err(EpisodeError::Unsupported(STATIC_UNSUPPORTED.into()))
    }

    fn update_episode(&mut self, _notes: &str) -> Result<bool, EpisodeError> {
        Err(EpisodeError::Unsupported(STATIC_UNSUPPORTED.into()))
    }

    fn add_step_tag(&mut self, _index: usize, _label: &str) -> Result<bool, EpisodeError> {
        Err(EpisodeError::Unsupported(STATIC_UNSUPPORTED.into()))
    }

    fn remove_step_tag(&mut self, _index: usize, _label: &str) -> Result<bool, EpisodeError> {
        Err(EpisodeError::Unsupported(STATIC_UNSUPPORTED.into()))
    }
}
