//! Access rules and identifiers derived from studies and episodes.

use crate::error::EpisodeError;
use crate::model::{Episode, StudySpec, StudyState};
use environment::EnvironmentSpec;
use sha2::{Digest, Sha256};
use std::fs;
use tracing::{info, warn};

pub const METADATA_NAMESPACE: &str = "rlds_creator:";

#[must_use]
pub fn env_spec_by_id<'a>(study: &'a StudySpec, env_id: &str) -> Option<&'a EnvironmentSpec> {
    study.environment_specs.iter().find(|spec| spec.id == env_id)
}

pub fn validate_study_spec(study: &StudySpec) -> Result<(), EpisodeError> {
    if study.creator.email.is_empty() {
        return Err(EpisodeError::Invalid("Creator email should be set.".into()));
    }
    if study.environment_specs.is_empty() {
        return Err(EpisodeError::Invalid("No environment specified.".into()));
    }
    if study.environment_specs.iter().any(|spec| spec.id.is_empty()) {
        return Err(EpisodeError::Invalid("Environment ID is missing.".into()));
    }
    Ok(())
}

#[must_use]
pub fn can_access_study(study: &StudySpec, email: &str) -> bool {
    study.creator.email == email || study.state == StudyState::Enabled
}

#[must_use]
pub fn can_update_study(study: &StudySpec, email: &str) -> bool {
    study.creator.email == email
}

/// Only the user that recorded an episode may delete it.
#[must_use]
pub fn can_delete_episode(episode: &Episode, email: &str) -> bool {
    episode.user.email == email
}

fn hash_strings(items: &[&str]) -> String {
    hex::encode(Sha256::digest(items.join("#").as_bytes()))
}

/// Agent id of a user within a study. Stable for the same pair, unrelated
/// across studies.
#[must_use]
pub fn agent_id(study_id: &str, email: &str) -> String {
    hash_strings(&[email, study_id])
}

/// Episode id exposed in exported datasets.
#[must_use]
pub fn public_episode_id(study_id: &str, episode_id: &str) -> String {
    hash_strings(&[study_id, episode_id])
}

#[must_use]
pub fn metadata_key(name: &str) -> String {
    format!("{METADATA_NAMESPACE}{name}")
}

/// Removes the stored data of the episode. Failures are only logged.
pub fn delete_episode_storage(episode: &Episode) {
    let Some(storage) = &episode.storage else {
        return;
    };
    let path = storage.path();
    match fs::remove_file(path) {
        Ok(()) => info!("Deleted episode data {}", path.display()),
        Err(e) => {
            warn!("Failed to delete episode data {}: {e}", path.display());
            return;
        }
    }
    // The episode directory goes away once it is empty.
    if let Some(dir) = path.parent() {
        let _ = fs::remove_dir(dir);
    }
}
