//! # Creator
//!
//! The executable side of the recorder. It wires the library crates into two
//! processes:
//!
//! -   **`serve`:** one operator session over standard input and output. Every
//!     line of input is a JSON [`session::Request`]; every line of output a
//!     JSON [`session::Response`].
//! -   **`worker`:** the far end of a [`proxy::EnvironmentProxy`]. The
//!     environment runs in this process and answers proxy commands on
//!     standard input and output.
//!
//! ## The Crates
//!
//! -   **[`environment`]:** the environment contract and the sample families.
//! -   **[`proxy`]:** runs environments in worker processes.
//! -   **[`episode`]:** studies, sessions, recorded episodes, replay and merging.
//! -   **[`session`]:** the session controller serving one operator.
//!
//! Logs always go to standard error, since standard output carries the
//! protocol in both modes.

pub mod app;

pub use app::{environment_factory, load_studies, run_session, run_worker, LineSink};
