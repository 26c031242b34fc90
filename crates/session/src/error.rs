use environment::EnvError;
use episode::EpisodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The request cannot be served, e.g. it names a missing study. The
    /// message is shown to the operator as is.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Episode(#[from] EpisodeError),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl SessionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SessionError::Invalid(message.into())
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        match self {
            SessionError::Invalid(_) => true,
            SessionError::Episode(e) => e.is_validation(),
            _ => false,
        }
    }

    /// True if the environment can no longer be used, e.g. its worker stopped
    /// answering.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Env(e) | SessionError::Episode(EpisodeError::Env(e)) => e.is_fatal(),
            _ => false,
        }
    }

    /// The message sent to the operator.
    #[must_use]
    pub fn operator_message(&self) -> String {
        if self.is_validation() {
            self.to_string()
        } else {
            format!("Request failed: {self}")
        }
    }
}
