use crate::error::EpisodeError;
use crate::io::{EpisodeReader, EpisodeStorageFactory, StorageSpec, INTERNAL_STEP_KEYS};
use crate::model::Episode;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use environment::{Action, Metadata, Specs, TimeStep};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Key of the episode metadata stored in the custom data of the first step
/// by older recorders.
const LEGACY_EPISODE_METADATA: &str = "episode_metadata";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergerOptions {
    /// Drop internal step keys (frames, input keys, info) and the episode
    /// tags and notes from the output.
    pub strip_internal_metadata: bool,
    /// An episode ends at the first step tagged with one of these labels.
    pub end_of_episode_tags: Vec<String>,
    /// Add a `tag:<label>` flag to the custom data of every step for every
    /// step tag used in any of the episodes.
    pub add_step_tags_as_metadata: bool,
    /// Number of episodes read ahead in parallel.
    pub prefetch: usize,
}

impl Default for MergerOptions {
    fn default() -> Self {
        Self {
            strip_internal_metadata: false,
            end_of_episode_tags: Vec::new(),
            add_step_tags_as_metadata: false,
            prefetch: 4,
        }
    }
}

type ReaderResult = Result<Box<dyn EpisodeReader>, EpisodeError>;

struct ReadJob {
    spec: StorageSpec,
    reply: Sender<ReaderResult>,
}

/// Fixed pool of reader threads. Results are delivered per job, so the
/// consumer decides the order.
struct ReaderPool {
    jobs: Option<Sender<ReadJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl ReaderPool {
    fn new(size: usize, factory: &Arc<dyn EpisodeStorageFactory>) -> Result<Self, EpisodeError> {
        let (jobs, queue) = unbounded::<ReadJob>();
        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let queue = queue.clone();
            let factory = Arc::clone(factory);
            let handle = thread::Builder::new()
                .name(format!("episode-reader-{i}"))
                .spawn(move || {
                    while let Ok(job) = queue.recv() {
                        let _ = job.reply.send(factory.create_reader(&job.spec));
                    }
                })
                .map_err(|e| EpisodeError::Pool(e.to_string()))?;
            workers.push(handle);
        }
        Ok(Self { jobs: Some(jobs), workers })
    }

    fn submit(&self, spec: StorageSpec) -> Result<Receiver<ReaderResult>, EpisodeError> {
        let (reply, result) = bounded(1);
        self.jobs
            .as_ref()
            .ok_or_else(|| EpisodeError::Pool("reader pool is shut down".into()))?
            .send(ReadJob { spec, reply })
            .map_err(|_| EpisodeError::Pool("reader pool is shut down".into()))?;
        Ok(result)
    }

    fn shutdown(&mut self) {
        self.jobs = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Presents a list of recorded episodes as one steppable stream.
///
/// Readers are created ahead of time on a pool of
/// [`MergerOptions::prefetch`] threads but always consumed in input order.
/// Each episode starts with [`reset`](Merger::reset) and continues with
/// [`step`](Merger::step) until its last timestep; [`done`](Merger::done)
/// turns true once the last step of the last episode was returned.
pub struct Merger {
    episodes: Vec<Episode>,
    options: MergerOptions,
    end_tags: BTreeSet<String>,
    step_tags: BTreeSet<String>,
    pool: ReaderPool,
    pending: VecDeque<Receiver<ReaderResult>>,
    next_submit: usize,
    specs: Specs,
    first_reader: Option<Box<dyn EpisodeReader>>,
    reader: Option<Box<dyn EpisodeReader>>,
    episode_index: usize,
    num_steps: usize,
    total_reward: f64,
    step_index: usize,
    done: bool,
    custom_data: Value,
    episode_metadata: Metadata,
}

impl Merger {
    pub fn new(
        episodes: Vec<Episode>,
        factory: Arc<dyn EpisodeStorageFactory>,
        options: MergerOptions,
    ) -> Result<Self, EpisodeError> {
        if episodes.is_empty() {
            return Err(EpisodeError::Invalid("No episodes to merge.".into()));
        }
        let window = options.prefetch.max(1);
        let pool = ReaderPool::new(window.min(episodes.len()), &factory)?;
        let end_tags = options.end_of_episode_tags.iter().cloned().collect();
        let step_tags = if options.add_step_tags_as_metadata {
            episodes
                .iter()
                .flat_map(|e| e.step_metadata.values())
                .flat_map(|m| m.tags.iter().map(|t| t.label.clone()))
                .collect()
        } else {
            BTreeSet::new()
        };
        let mut merger = Self {
            episodes,
            options,
            end_tags,
            step_tags,
            pool,
            pending: VecDeque::new(),
            next_submit: 0,
            specs: placeholder_specs(),
            first_reader: None,
            reader: None,
            episode_index: 0,
            num_steps: 0,
            total_reward: 0.0,
            step_index: 0,
            done: false,
            custom_data: Value::Null,
            episode_metadata: Metadata::new(),
        };
        merger.fill_window(window)?;
        // All episodes share the specs of the first one.
        let first = merger.next_reader()?;
        merger.specs = first.specs().clone();
        merger.first_reader = Some(first);
        Ok(merger)
    }

    fn fill_window(&mut self, window: usize) -> Result<(), EpisodeError> {
        while self.pending.len() < window && self.next_submit < self.episodes.len() {
            let episode = &self.episodes[self.next_submit];
            let spec = episode.storage.clone().ok_or_else(|| {
                EpisodeError::Missing(format!("Episode {} has no stored data.", episode.id))
            })?;
            self.pending.push_back(self.pool.submit(spec)?);
            self.next_submit += 1;
        }
        Ok(())
    }

    fn next_reader(&mut self) -> Result<Box<dyn EpisodeReader>, EpisodeError> {
        let result = self
            .pending
            .pop_front()
            .ok_or_else(|| EpisodeError::Invalid("No more episodes.".into()))?
            .recv()
            .map_err(|_| EpisodeError::Pool("episode reader stopped".into()))?;
        self.fill_window(self.options.prefetch.max(1))?;
        result
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn specs(&self) -> &Specs {
        &self.specs
    }

    /// Index of the episode being merged.
    #[must_use]
    pub fn episode_index(&self) -> usize {
        self.episode_index
    }

    #[must_use]
    pub fn num_episodes(&self) -> usize {
        self.episodes.len()
    }

    /// Starts the next episode and returns its first timestep.
    pub fn reset(&mut self) -> Result<TimeStep, EpisodeError> {
        if self.done || self.episode_index >= self.episodes.len() {
            return Err(EpisodeError::Invalid("No more episodes.".into()));
        }
        let reader = match self.first_reader.take() {
            Some(reader) => reader,
            None => self.next_reader()?,
        };
        let episode = &self.episodes[self.episode_index];
        debug!("Merging episode {}", episode.id);
        let steps = reader.steps();
        if steps.is_empty() {
            return Err(EpisodeError::Invalid(format!("Episode {} has no steps.", episode.id)));
        }
        let last_index = steps.len() - 1;
        self.num_steps = if episode.num_steps == 0 { last_index } else { episode.num_steps.min(last_index) };
        self.total_reward = episode.total_reward;

        if !self.end_tags.is_empty() {
            let cut = episode.step_metadata.iter().find(|(index, metadata)| {
                **index <= last_index && metadata.tags.iter().any(|t| self.end_tags.contains(&t.label))
            });
            if let Some((&index, _)) = cut {
                info!("Episode terminates at step {index}.");
                self.num_steps = index;
                self.total_reward = steps[..=index].iter().map(|s| s.reward()).sum();
            }
        }

        self.episode_metadata = reader.metadata().clone();
        self.reader = Some(reader);
        self.step_index = 0;
        self.advance()
    }

    /// Returns the next stored timestep. The action is ignored; use
    /// [`next_action`](Merger::next_action) to get the recorded one.
    pub fn step(&mut self, _action: &Action) -> Result<TimeStep, EpisodeError> {
        if self.reader.is_none() || self.step_index > self.num_steps {
            return Err(EpisodeError::Invalid("The episode is finished; reset first.".into()));
        }
        self.advance()
    }

    /// The recorded action that leads to the next timestep.
    #[must_use]
    pub fn next_action(&self) -> Option<&Action> {
        if self.step_index > self.num_steps {
            return None;
        }
        self.reader.as_ref()?.steps().get(self.step_index).map(|s| &s.action)
    }

    /// Custom data of the last returned step.
    #[must_use]
    pub fn custom_data(&self) -> &Value {
        &self.custom_data
    }

    /// Metadata of the current episode, complete once its first step was
    /// returned.
    #[must_use]
    pub fn episode_metadata(&self) -> &Metadata {
        &self.episode_metadata
    }

    pub fn close(&mut self) {
        self.pending.clear();
        self.pool.shutdown();
    }

    fn advance(&mut self) -> Result<TimeStep, EpisodeError> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| EpisodeError::Invalid("No episode is being merged.".into()))?;
        let current = &reader.steps()[self.step_index];
        let episode = &self.episodes[self.episode_index];

        let mut custom_data = match &current.custom_data {
            Value::Object(map) if self.options.strip_internal_metadata => Value::Object(
                map.iter()
                    .filter(|(k, _)| !INTERNAL_STEP_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        };
        if !self.step_tags.is_empty() {
            let tagged: BTreeSet<&str> = episode
                .step_metadata
                .get(&self.step_index)
                .map(|m| m.tags.iter().map(|t| t.label.as_str()).collect())
                .unwrap_or_default();
            if !custom_data.is_object() {
                custom_data = Value::Object(Map::new());
            }
            if let Value::Object(map) = &mut custom_data {
                for label in &self.step_tags {
                    map.insert(format!("tag:{label}"), json!(tagged.contains(label.as_str())));
                }
            }
        }
        self.custom_data = custom_data;

        let mut timestep = current.timestep.clone();
        if timestep.first() {
            self.update_episode_metadata();
        }
        self.step_index += 1;
        if self.step_index > self.num_steps {
            if !timestep.last() {
                info!("Fixing last step.");
                timestep = TimeStep::truncation(timestep.reward, timestep.observation);
            }
            self.episode_index += 1;
            self.done = self.episode_index == self.episodes.len();
        }
        Ok(timestep)
    }

    fn update_episode_metadata(&mut self) {
        if let Value::Object(custom) = &mut self.custom_data {
            if let Some(Value::Object(legacy)) = custom.remove(LEGACY_EPISODE_METADATA) {
                self.episode_metadata.extend(legacy);
            }
        }
        let episode = &self.episodes[self.episode_index];
        let metadata = &mut self.episode_metadata;
        metadata.insert("episode_index".into(), json!(self.episode_index));
        metadata.insert("num_steps".into(), json!(self.num_steps));
        metadata.insert("total_reward".into(), json!(self.total_reward));
        if !self.options.strip_internal_metadata {
            if !episode.tags.is_empty() {
                metadata.insert("tags".into(), json!(episode.tag_labels()));
            }
            if !episode.notes.is_empty() {
                metadata.insert("notes".into(), json!(episode.notes));
            }
        }
    }
}

impl Drop for Merger {
    fn drop(&mut self) {
        self.close();
    }
}

fn placeholder_specs() -> Specs {
    use environment::ArraySpec;
    Specs {
        observation: ArraySpec::scalar("observation"),
        action: ArraySpec::scalar("action"),
        reward: ArraySpec::scalar("reward"),
        discount: ArraySpec::scalar("discount"),
    }
}
