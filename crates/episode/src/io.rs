use crate::error::EpisodeError;
use environment::{Action, Metadata, Specs, TimeStep};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Custom data key of the rendered frame of a step.
pub const METADATA_IMAGE: &str = "image";
/// Custom data key of the operator input that produced a step.
pub const METADATA_KEYS: &str = "keys";
/// Custom data key of the auxiliary environment info of a step.
pub const METADATA_INFO: &str = "info";

/// Bookkeeping keys of the step custom data.
pub const INTERNAL_STEP_KEYS: [&str; 3] = [METADATA_IMAGE, METADATA_KEYS, METADATA_INFO];

/// One recorded step: the timestep, the action that led to it (null for the
/// first step) and the custom data of the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub timestep: TimeStep,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub custom_data: Value,
}

impl StepData {
    #[must_use]
    pub fn new(timestep: TimeStep, action: Action, custom_data: Value) -> Self {
        Self { timestep, action, custom_data }
    }

    #[must_use]
    pub fn reward(&self) -> f64 {
        self.timestep.reward.unwrap_or(0.0)
    }
}

/// Where the data of an episode is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSpec {
    /// A JSON document written by [`crate::JsonStorageFactory`].
    Json { path: PathBuf },
}

impl StorageSpec {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            StorageSpec::Json { path } => path,
        }
    }

    /// The same storage after its directory was moved to `dir`.
    #[must_use]
    pub fn relocated(&self, dir: &Path) -> Self {
        match self {
            StorageSpec::Json { path } => {
                let file = path.file_name().map_or_else(PathBuf::new, PathBuf::from);
                StorageSpec::Json { path: dir.join(file) }
            }
        }
    }
}

/// Read access to one recorded episode.
pub trait EpisodeReader: Send {
    fn metadata(&self) -> &Metadata;

    fn steps(&self) -> &[StepData];

    /// Specs of the environment the episode was recorded with.
    fn specs(&self) -> &Specs;
}

/// Records episodes of one environment.
///
/// The usual sequence is `start_episode`, one `record_step` per timestep
/// starting with the one returned by reset, then `end_episode`.
pub trait EpisodeWriter: Send {
    fn start_episode(&mut self) -> Result<(), EpisodeError>;

    fn record_step(&mut self, step: StepData) -> Result<(), EpisodeError>;

    fn end_episode(&mut self, metadata: Metadata) -> Result<StorageSpec, EpisodeError>;

    fn close(&mut self) -> Result<(), EpisodeError>;
}

pub trait EpisodeStorageFactory: Send + Sync {
    fn create_reader(&self, spec: &StorageSpec) -> Result<Box<dyn EpisodeReader>, EpisodeError>;

    /// Creates a writer of the given kind that stores its episodes in `dir`.
    /// `metadata` describes the environment and is stored with every episode.
    fn create_writer(
        &self,
        kind: &str,
        dir: &Path,
        specs: Specs,
        metadata: Metadata,
    ) -> Result<Box<dyn EpisodeWriter>, EpisodeError>;
}
