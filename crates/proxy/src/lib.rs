#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc, clippy::must_use_candidate)]
//! # Environment Process Proxy
//!
//! Runs an [`environment::Environment`] behind a channel so that it can live
//! in a separate worker process, isolated from the recording service.
//!
//! The caller holds an [`EnvironmentProxy`], which implements the same
//! contract as a local environment. Every call becomes one [`Command`] sent
//! to a worker loop ([`serve`]) and one [`Reply`] sent back. Failures inside
//! the worker travel back as data and are re-raised as the same
//! [`environment::EnvError`] a local environment would have produced.
//!
//! Failures of the channel itself (the worker does not answer within
//! [`ProxyConfig::recv_timeout`], or the channel closes) are fatal to the
//! proxy.

pub mod channel;
pub mod command;
pub mod factory;
pub mod proxy;
pub mod worker;

pub use channel::Endpoint;
pub use command::{Command, ErrorEnvelope, Opcode, Reply};
pub use factory::{ProxiedFactory, WorkerLaunch};
pub use proxy::{EnvironmentProxy, ProxyConfig, ThreadWorker, WorkerHandle};
pub use worker::serve;
