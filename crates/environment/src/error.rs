use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("environment is not initialized")]
    NotInitialized,
    #[error("environment is closed")]
    Closed,
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("image encoding failed: {0}")]
    Encoding(String),
    #[error("{0}")]
    Failed(String),
    #[error("environment proxy timed out after {0:?}")]
    Timeout(Duration),
    #[error("environment proxy channel failed: {0}")]
    Channel(String),
}

/// Discriminant of [`EnvError`], used when an error has to cross a process
/// boundary as plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidAction,
    NotInitialized,
    Closed,
    Unsupported,
    UnknownEnvironment,
    Encoding,
    Failed,
    Timeout,
    Channel,
}

impl EnvError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvError::InvalidAction(_) => ErrorKind::InvalidAction,
            EnvError::NotInitialized => ErrorKind::NotInitialized,
            EnvError::Closed => ErrorKind::Closed,
            EnvError::Unsupported(_) => ErrorKind::Unsupported,
            EnvError::UnknownEnvironment(_) => ErrorKind::UnknownEnvironment,
            EnvError::Encoding(_) => ErrorKind::Encoding,
            EnvError::Failed(_) => ErrorKind::Failed,
            EnvError::Timeout(_) => ErrorKind::Timeout,
            EnvError::Channel(_) => ErrorKind::Channel,
        }
    }

    /// Payload of the error without the variant prefix. Timeouts are carried
    /// as milliseconds so that [`EnvError::from_parts`] restores them exactly.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            EnvError::InvalidAction(s)
            | EnvError::Unsupported(s)
            | EnvError::UnknownEnvironment(s)
            | EnvError::Encoding(s)
            | EnvError::Failed(s)
            | EnvError::Channel(s) => s.clone(),
            EnvError::Timeout(d) => d.as_millis().to_string(),
            EnvError::NotInitialized | EnvError::Closed => String::new(),
        }
    }

    /// Rebuilds an error from its kind and detail.
    #[must_use]
    pub fn from_parts(kind: ErrorKind, detail: String) -> Self {
        match kind {
            ErrorKind::InvalidAction => EnvError::InvalidAction(detail),
            ErrorKind::NotInitialized => EnvError::NotInitialized,
            ErrorKind::Closed => EnvError::Closed,
            ErrorKind::Unsupported => EnvError::Unsupported(detail),
            ErrorKind::UnknownEnvironment => EnvError::UnknownEnvironment(detail),
            ErrorKind::Encoding => EnvError::Encoding(detail),
            ErrorKind::Failed => EnvError::Failed(detail),
            ErrorKind::Timeout => {
                EnvError::Timeout(Duration::from_millis(detail.parse().unwrap_or_default()))
            }
            ErrorKind::Channel => EnvError::Channel(detail),
        }
    }

    /// Channel failures leave an environment handle unusable; the operator
    /// has to select the environment again.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnvError::Timeout(_) | EnvError::Channel(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_restore_every_variant() {
        let errors = [
            EnvError::InvalidAction("bad".into()),
            EnvError::NotInitialized,
            EnvError::Closed,
            EnvError::Unsupported("render".into()),
            EnvError::UnknownEnvironment("pong".into()),
            EnvError::Encoding("jpeg".into()),
            EnvError::Failed("boom".into()),
            EnvError::Timeout(Duration::from_millis(1500)),
            EnvError::Channel("broken pipe".into()),
        ];
        for err in errors {
            let restored = EnvError::from_parts(err.kind(), err.detail());
            assert_eq!(restored, err);
        }
    }

    #[test]
    fn only_channel_errors_are_fatal() {
        assert!(EnvError::Timeout(Duration::from_secs(60)).is_fatal());
        assert!(EnvError::Channel("eof".into()).is_fatal());
        assert!(!EnvError::Failed("boom".into()).is_fatal());
    }
}
