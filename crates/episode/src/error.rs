use environment::EnvError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpisodeError {
    /// A request that cannot be served as asked, e.g. an unknown step index.
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Missing(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("episode reader pool failed: {0}")]
    Pool(String),
}

impl EpisodeError {
    /// True for failures caused by the request rather than by the system,
    /// whose message is meant for the operator.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, EpisodeError::Invalid(_) | EpisodeError::Missing(_) | EpisodeError::Unsupported(_))
    }
}
