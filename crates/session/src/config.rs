use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings of a session controller. Missing fields take their defaults, so
/// an empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root of the session directories and of the downloads.
    pub base_log_dir: PathBuf,
    /// Step rate of asynchronous environments.
    pub fps: f64,
    /// Asynchronous environments pause after this long without input.
    pub idle_timeout_secs: f64,
    /// Episodes read ahead while exporting.
    pub merger_prefetch: usize,
    pub record_videos: bool,
    pub episode_storage_kind: String,
    /// Run environments in worker processes.
    pub use_proxy: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_log_dir: PathBuf::from("./logs"),
            fps: 15.0,
            idle_timeout_secs: 6.0,
            merger_prefetch: 4,
            record_videos: false,
            episode_storage_kind: episode::JSON_KIND.to_string(),
            use_proxy: false,
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SessionError::invalid(format!("Invalid config {}: {e}", path.display())))
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.idle_timeout_secs.max(0.0))
    }

    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.base_log_dir.join("download")
    }
}
