use crate::error::EpisodeError;
use crate::io::{EpisodeReader, EpisodeStorageFactory, EpisodeWriter, StepData, StorageSpec};
use environment::{Metadata, Specs};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const JSON_KIND: &str = "json";

/// On-disk layout of one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEpisode {
    pub specs: Specs,
    #[serde(default)]
    pub environment_metadata: Metadata,
    #[serde(default)]
    pub metadata: Metadata,
    pub steps: Vec<StepData>,
}

impl JsonEpisode {
    pub fn load(path: &Path) -> Result<Self, EpisodeError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EpisodeError::Missing(format!("Missing episode file {}.", path.display()))
            } else {
                EpisodeError::Io(e)
            }
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl EpisodeReader for JsonEpisode {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn steps(&self) -> &[StepData] {
        &self.steps
    }

    fn specs(&self) -> &Specs {
        &self.specs
    }
}

/// Writes every episode to `<dir>/<index>.json`.
pub struct JsonEpisodeWriter {
    dir: PathBuf,
    specs: Specs,
    environment_metadata: Metadata,
    next_index: usize,
    steps: Option<Vec<StepData>>,
}

impl JsonEpisodeWriter {
    pub fn new(dir: &Path, specs: Specs, metadata: Metadata) -> Result<Self, EpisodeError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            specs,
            environment_metadata: metadata,
            next_index: 0,
            steps: None,
        })
    }
}

impl EpisodeWriter for JsonEpisodeWriter {
    fn start_episode(&mut self) -> Result<(), EpisodeError> {
        if self.steps.is_some() {
            return Err(EpisodeError::Invalid("An episode is already being recorded.".into()));
        }
        self.steps = Some(Vec::new());
        Ok(())
    }

    fn record_step(&mut self, step: StepData) -> Result<(), EpisodeError> {
        self.steps
            .as_mut()
            .ok_or_else(|| EpisodeError::Invalid("No episode is being recorded.".into()))?
            .push(step);
        Ok(())
    }

    fn end_episode(&mut self, metadata: Metadata) -> Result<StorageSpec, EpisodeError> {
        let steps = self
            .steps
            .take()
            .ok_or_else(|| EpisodeError::Invalid("No episode is being recorded.".into()))?;
        let path = self.dir.join(format!("{}.json", self.next_index));
        self.next_index += 1;
        let episode = JsonEpisode {
            specs: self.specs.clone(),
            environment_metadata: self.environment_metadata.clone(),
            metadata,
            steps,
        };
        let mut out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut out, &episode)?;
        out.flush()?;
        debug!("Wrote {} steps to {}", episode.steps.len(), path.display());
        Ok(StorageSpec::Json { path })
    }

    /// Drops an unfinished episode.
    fn close(&mut self) -> Result<(), EpisodeError> {
        if let Some(steps) = self.steps.take() {
            debug!("Discarding {} unfinished steps", steps.len());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStorageFactory;

impl EpisodeStorageFactory for JsonStorageFactory {
    fn create_reader(&self, spec: &StorageSpec) -> Result<Box<dyn EpisodeReader>, EpisodeError> {
        match spec {
            StorageSpec::Json { path } => Ok(Box::new(JsonEpisode::load(path)?)),
        }
    }

    fn create_writer(
        &self,
        kind: &str,
        dir: &Path,
        specs: Specs,
        metadata: Metadata,
    ) -> Result<Box<dyn EpisodeWriter>, EpisodeError> {
        if kind != JSON_KIND {
            return Err(EpisodeError::Unsupported(format!("Unsupported episode storage {kind}.")));
        }
        Ok(Box::new(JsonEpisodeWriter::new(dir, specs, metadata)?))
    }
}
