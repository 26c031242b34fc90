#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
//! # Environment Contract
//!
//! The contract every simulated environment driven by an operator has to
//! fulfil, together with the value types that flow across it.
//!
//! An environment is stepped one action at a time and answers with a
//! [`TimeStep`]. Besides stepping, the operator-facing layer needs a few
//! extra capabilities: rendering the current state as an [`Image`], mapping
//! raw operator input ([`UserInput`]) to an environment action, switching
//! cameras and reporting metadata. All of them are bundled in the
//! [`Environment`] trait.
//!
//! ## Key Components
//!
//! -   **[`Environment`]:** the trait implemented by concrete environments and
//!     by the process proxy.
//! -   **[`EnvironmentSpec`]:** the serialisable description of an environment.
//!     The family is a tagged union ([`EnvironmentKind`]) so factories can
//!     dispatch on it with an exhaustive `match`.
//! -   **[`EnvironmentFactory`]:** creates environments from their spec. The
//!     [`BuiltinFactory`] knows the sample families shipped with this crate.
//! -   **Sample families:** [`RollingSphereEnv`] and [`StickBalanceEnv`]. They
//!     are small, deterministic and cheap to render, which makes them useful
//!     for tests and for exercising the recording pipeline end to end.

pub mod environment;
pub mod error;
pub mod factory;
pub mod frame;
pub mod input;
pub mod rolling_sphere;
pub mod spec;
pub mod stick_balance;
pub mod timestep;

pub use environment::{Action, Camera, Environment, Metadata};
pub use error::{EnvError, ErrorKind};
pub use factory::{BuiltinFactory, EnvironmentFactory, EnvironmentKind, EnvironmentSpec};
pub use frame::{encode_jpeg, encode_png, Image, Quality};
pub use input::{Controller, Keys, UserInput};
pub use rolling_sphere::{RollingSphereConfig, RollingSphereEnv};
pub use spec::{ArraySpec, DType, Specs};
pub use stick_balance::{StickBalanceConfig, StickBalanceEnv};
pub use timestep::{StepType, TimeStep};
