#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_precision_loss
)]
//! Studies, sessions and recorded episodes.
//!
//! This crate holds the record side of the system: the data model, the
//! storage of study records ([`Storage`]), the storage of episode data
//! ([`EpisodeStorageFactory`] with its readers and writers), replaying
//! episodes with tag editing ([`Replay`]) and merging recorded episodes into
//! one stream for export ([`Merger`]).

pub mod error;
pub mod io;
pub mod json_storage;
pub mod merger;
pub mod model;
pub mod policy;
pub mod replay;
pub mod storage;

pub use error::EpisodeError;
pub use io::{
    EpisodeReader, EpisodeStorageFactory, EpisodeWriter, StepData, StorageSpec,
    INTERNAL_STEP_KEYS, METADATA_IMAGE, METADATA_INFO, METADATA_KEYS,
};
pub use json_storage::{JsonEpisode, JsonEpisodeWriter, JsonStorageFactory, JSON_KIND};
pub use merger::{Merger, MergerOptions};
pub use model::{
    Episode, EpisodeRef, EpisodeState, Session, SessionState, StepMetadata, StudySpec, StudyState,
    Tag, User,
};
pub use replay::{Replay, StaticReplay, StorageReplay};
pub use storage::{validate_episode, validate_session, MemoryStorage, Storage};
