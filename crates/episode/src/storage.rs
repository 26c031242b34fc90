use crate::error::EpisodeError;
use crate::model::{Episode, Session, StudySpec, StudyState};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::info;

/// Durable storage of studies, sessions and episode records.
///
/// Episode *data* (the steps) lives elsewhere; see
/// [`crate::io::EpisodeStorageFactory`].
pub trait Storage: Send + Sync {
    /// Creates a study and returns its id. A missing id is generated; the
    /// creation time is always set by the storage.
    fn create_study(&self, spec: StudySpec) -> Result<String, EpisodeError>;

    fn get_study(&self, study_id: &str) -> Result<Option<StudySpec>, EpisodeError>;

    fn update_study_state(&self, study_id: &str, state: StudyState) -> Result<(), EpisodeError>;

    /// Replaces an existing study. Its state and creation time are kept.
    fn update_study(&self, spec: &StudySpec) -> Result<(), EpisodeError>;

    /// Studies ordered by creation time, optionally filtered by state and by
    /// the email of their creator.
    fn get_studies(
        &self,
        state: Option<StudyState>,
        email: Option<&str>,
    ) -> Result<Vec<StudySpec>, EpisodeError>;

    fn create_session(&self, session: &Session) -> Result<(), EpisodeError>;

    fn update_session(&self, session: &Session) -> Result<(), EpisodeError>;

    fn get_session(&self, study_id: &str, session_id: &str)
        -> Result<Option<Session>, EpisodeError>;

    /// Stores an episode record, replacing a previous record with the same id.
    fn create_episode(&self, episode: &Episode) -> Result<(), EpisodeError>;

    fn get_episode(
        &self,
        study_id: &str,
        session_id: &str,
        episode_id: &str,
    ) -> Result<Option<Episode>, EpisodeError>;

    /// Reads the episode, lets `update` modify it and stores the result if
    /// `update` returns true, all as one atomic operation.
    ///
    /// Returns false if the episode is missing, `update` rejects the change
    /// or it tried to change the study, session or episode id.
    fn atomic_update_episode(
        &self,
        study_id: &str,
        session_id: &str,
        episode_id: &str,
        update: &mut dyn FnMut(&mut Episode) -> bool,
    ) -> Result<bool, EpisodeError>;

    /// Episodes of a study, newest first, optionally only those recorded by
    /// the user with the given email.
    fn get_episodes(&self, study_id: &str, email: Option<&str>)
        -> Result<Vec<Episode>, EpisodeError>;

    /// Returns true if an episode was deleted.
    fn delete_episode(
        &self,
        study_id: &str,
        session_id: &str,
        episode_id: &str,
    ) -> Result<bool, EpisodeError>;
}

pub fn validate_session(session: &Session) -> Result<(), EpisodeError> {
    if session.study_id.is_empty() {
        return Err(EpisodeError::Invalid("Study ID should be set.".into()));
    }
    if session.id.is_empty() {
        return Err(EpisodeError::Invalid("Session ID should be set.".into()));
    }
    if session.start_time.is_none() {
        return Err(EpisodeError::Invalid("Start time should be set.".into()));
    }
    Ok(())
}

pub fn validate_episode(episode: &Episode) -> Result<(), EpisodeError> {
    if episode.study_id.is_empty() {
        return Err(EpisodeError::Invalid("Study ID should be set.".into()));
    }
    if episode.session_id.is_empty() {
        return Err(EpisodeError::Invalid("Session ID should be set.".into()));
    }
    if episode.id.is_empty() {
        return Err(EpisodeError::Invalid("Episode ID should be set.".into()));
    }
    Ok(())
}

type SessionKey = (String, String);
type EpisodeKey = (String, String, String);

#[derive(Debug, Default)]
struct Tables {
    seq: u64,
    studies: BTreeMap<String, (u64, StudySpec)>,
    sessions: BTreeMap<SessionKey, Session>,
    episodes: BTreeMap<EpisodeKey, (u64, Episode)>,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// [`Storage`] kept in memory. Used by tests and the stdio server.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn episode_key(study_id: &str, session_id: &str, episode_id: &str) -> EpisodeKey {
    (study_id.to_string(), session_id.to_string(), episode_id.to_string())
}

impl Storage for MemoryStorage {
    fn create_study(&self, mut spec: StudySpec) -> Result<String, EpisodeError> {
        if spec.id.is_empty() {
            spec.id = uuid::Uuid::new_v4().simple().to_string();
        }
        spec.creation_time = Some(Utc::now());
        info!("Creating study with ID {}", spec.id);
        let id = spec.id.clone();
        let mut tables = self.tables.write();
        let seq = tables.next_seq();
        tables.studies.insert(id.clone(), (seq, spec));
        Ok(id)
    }

    fn get_study(&self, study_id: &str) -> Result<Option<StudySpec>, EpisodeError> {
        Ok(self.tables.read().studies.get(study_id).map(|(_, s)| s.clone()))
    }

    fn update_study_state(&self, study_id: &str, state: StudyState) -> Result<(), EpisodeError> {
        let mut tables = self.tables.write();
        let (_, spec) = tables
            .studies
            .get_mut(study_id)
            .ok_or_else(|| EpisodeError::Missing("Missing study.".into()))?;
        spec.state = state;
        Ok(())
    }

    fn update_study(&self, spec: &StudySpec) -> Result<(), EpisodeError> {
        let mut tables = self.tables.write();
        let (_, stored) = tables
            .studies
            .get_mut(&spec.id)
            .ok_or_else(|| EpisodeError::Missing("Missing study.".into()))?;
        let state = stored.state;
        let creation_time = stored.creation_time;
        *stored = StudySpec { state, creation_time, ..spec.clone() };
        Ok(())
    }

    fn get_studies(
        &self,
        state: Option<StudyState>,
        email: Option<&str>,
    ) -> Result<Vec<StudySpec>, EpisodeError> {
        let tables = self.tables.read();
        let mut studies: Vec<_> = tables
            .studies
            .values()
            .filter(|(_, s)| state.map_or(true, |state| s.state == state))
            .filter(|(_, s)| email.map_or(true, |email| s.creator.email == email))
            .collect();
        studies.sort_by_key(|(seq, s)| (s.creation_time, *seq));
        Ok(studies.into_iter().map(|(_, s)| s.clone()).collect())
    }

    fn create_session(&self, session: &Session) -> Result<(), EpisodeError> {
        validate_session(session)?;
        let mut tables = self.tables.write();
        if !tables.studies.contains_key(&session.study_id) {
            return Err(EpisodeError::Missing("Missing study.".into()));
        }
        info!("Creating session with ID {} for study {}.", session.id, session.study_id);
        tables
            .sessions
            .insert((session.study_id.clone(), session.id.clone()), session.clone());
        Ok(())
    }

    fn update_session(&self, session: &Session) -> Result<(), EpisodeError> {
        validate_session(session)?;
        let mut tables = self.tables.write();
        let stored = tables
            .sessions
            .get_mut(&(session.study_id.clone(), session.id.clone()))
            .ok_or_else(|| EpisodeError::Missing("Missing session.".into()))?;
        *stored = session.clone();
        Ok(())
    }

    fn get_session(
        &self,
        study_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, EpisodeError> {
        let key = (study_id.to_string(), session_id.to_string());
        Ok(self.tables.read().sessions.get(&key).cloned())
    }

    fn create_episode(&self, episode: &Episode) -> Result<(), EpisodeError> {
        validate_episode(episode)?;
        let mut tables = self.tables.write();
        let session_key = (episode.study_id.clone(), episode.session_id.clone());
        if !tables.sessions.contains_key(&session_key) {
            return Err(EpisodeError::Missing("Missing study or session.".into()));
        }
        info!(
            "Saving episode with ID {} for session {} in study {}.",
            episode.id, episode.session_id, episode.study_id
        );
        let seq = tables.next_seq();
        let key = episode_key(&episode.study_id, &episode.session_id, &episode.id);
        tables.episodes.insert(key, (seq, episode.clone()));
        Ok(())
    }

    fn get_episode(
        &self,
        study_id: &str,
        session_id: &str,
        episode_id: &str,
    ) -> Result<Option<Episode>, EpisodeError> {
        let key = episode_key(study_id, session_id, episode_id);
        Ok(self.tables.read().episodes.get(&key).map(|(_, e)| e.clone()))
    }

    fn atomic_update_episode(
        &self,
        study_id: &str,
        session_id: &str,
        episode_id: &str,
        update: &mut dyn FnMut(&mut Episode) -> bool,
    ) -> Result<bool, EpisodeError> {
        let key = episode_key(study_id, session_id, episode_id);
        let mut tables = self.tables.write();
        let Some((_, stored)) = tables.episodes.get_mut(&key) else {
            return Ok(false);
        };
        let mut episode = stored.clone();
        if !update(&mut episode) {
            return Ok(false);
        }
        if episode.study_id != study_id || episode.session_id != session_id || episode.id != episode_id
        {
            return Ok(false);
        }
        *stored = episode;
        Ok(true)
    }

    fn get_episodes(
        &self,
        study_id: &str,
        email: Option<&str>,
    ) -> Result<Vec<Episode>, EpisodeError> {
        let tables = self.tables.read();
        let mut episodes: Vec<_> = tables
            .episodes
            .values()
            .filter(|(_, e)| e.study_id == study_id)
            .filter(|(_, e)| email.map_or(true, |email| e.user.email == email))
            .collect();
        episodes.sort_by_key(|(seq, e)| std::cmp::Reverse((e.start_time, *seq)));
        Ok(episodes.into_iter().map(|(_, e)| e.clone()).collect())
    }

    fn delete_episode(
        &self,
        study_id: &str,
        session_id: &str,
        episode_id: &str,
    ) -> Result<bool, EpisodeError> {
        let key = episode_key(study_id, session_id, episode_id);
        Ok(self.tables.write().episodes.remove(&key).is_some())
    }
}
