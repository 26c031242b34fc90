use crate::io::StorageSpec;
use chrono::{DateTime, Utc};
use environment::{EnvironmentSpec, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
}

impl User {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyState {
    Enabled,
    #[default]
    Disabled,
}

/// A research configuration: the environments offered to operators and who
/// owns them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudySpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creator: User,
    pub state: StudyState,
    pub environment_specs: Vec<EnvironmentSpec>,
    pub creation_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub id: String,
    pub study_id: String,
    pub user: User,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub state: SessionState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeState {
    #[default]
    Active,
    Completed,
    Cancelled,
    Rejected,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
}

impl Tag {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepMetadata {
    pub tags: Vec<Tag>,
}

/// One recorded run of an environment.
///
/// The id has the form `{run_id}.{episode_index}` and is unique within a
/// session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Episode {
    pub id: String,
    pub study_id: String,
    pub environment_id: String,
    pub user: User,
    pub session_id: String,
    pub state: EpisodeState,
    pub num_steps: usize,
    pub total_reward: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub tags: Vec<Tag>,
    pub notes: String,
    /// Step tags keyed by the 0-based index of the step.
    pub step_metadata: BTreeMap<usize, StepMetadata>,
    pub storage: Option<StorageSpec>,
    /// Id of the input device used to record the episode, if any.
    pub controller_id: Option<String>,
}

impl Episode {
    #[must_use]
    pub fn reference(&self) -> EpisodeRef {
        EpisodeRef {
            study_id: self.study_id.clone(),
            session_id: self.session_id.clone(),
            episode_id: self.id.clone(),
        }
    }

    #[must_use]
    pub fn tag_labels(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.label.clone()).collect()
    }

    /// Duration of the episode in seconds, zero while it is not finished.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub study_id: String,
    pub session_id: String,
    pub episode_id: String,
}
