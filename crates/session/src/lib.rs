#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
//! # Operator Sessions
//!
//! One [`SessionController`] serves one operator. It receives [`Request`]s
//! from the client, drives the selected environment and records every
//! episode the operator plays, answering with [`Response`]s through a
//! [`ResponseSink`].
//!
//! ## Key Components
//!
//! -   **[`SessionController`]:** study and environment selection, stepping,
//!     pausing, episode bookkeeping, replay with tag editing and export.
//! -   **[`timer`]:** the thread that steps asynchronous environments at the
//!     configured rate and pauses them when the operator goes idle.
//! -   **[`export`]:** merges recorded episodes into a downloadable dataset,
//!     optionally as a zip archive.
//! -   **[`SessionConfig`]:** the serialisable settings, sent to the client
//!     when the session starts.

pub mod artifacts;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod listing;
pub mod request;
pub mod sink;
pub mod timer;

pub use config::SessionConfig;
pub use controller::{action_keys, SessionContext, SessionController, PAUSE_KEY, RESET_KEY};
pub use error::SessionError;
pub use export::{collect_episodes, export_episodes};
pub use request::{
    Data, DownloadRequest, EpisodeMetadata, GamepadInput, NamedImage, Request, Response,
};
pub use sink::{ChannelSink, ResponseSink};
