//! Export of recorded episodes as one downloadable dataset.

use crate::artifacts::create_archive;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::request::DownloadRequest;
use environment::Metadata;
use episode::{Episode, EpisodeRef, EpisodeStorageFactory, Merger, MergerOptions, StepData, Storage};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Loads the referenced episodes, checking that they all exist and come
/// from the same study and environment.
pub fn collect_episodes(
    storage: &dyn Storage,
    refs: &[EpisodeRef],
) -> Result<Vec<Episode>, SessionError> {
    let mut study_id: Option<&str> = None;
    let mut environment_id: Option<String> = None;
    let mut episodes = Vec::with_capacity(refs.len());
    for reference in refs {
        match study_id {
            None => study_id = Some(&reference.study_id),
            Some(id) if id != reference.study_id => {
                return Err(SessionError::invalid("Episodes are not from the same study."));
            }
            Some(_) => {}
        }
        let episode = storage
            .get_episode(&reference.study_id, &reference.session_id, &reference.episode_id)?
            .ok_or_else(|| SessionError::invalid("One of the episodes is missing."))?;
        match &environment_id {
            None => environment_id = Some(episode.environment_id.clone()),
            Some(id) if *id != episode.environment_id => {
                return Err(SessionError::invalid("Episodes must be from the same environment."));
            }
            Some(_) => {}
        }
        episodes.push(episode);
    }
    Ok(episodes)
}

/// Merges the requested episodes and writes them as a new dataset under
/// `{base_log_dir}/download`.
///
/// `progress` is called with the completed percentage after every episode.
/// Returns the location of the dataset: a zip archive if requested,
/// otherwise a directory.
pub fn export_episodes(
    storage: &dyn Storage,
    factory: &Arc<dyn EpisodeStorageFactory>,
    config: &SessionConfig,
    request: &DownloadRequest,
    progress: &mut dyn FnMut(f64),
) -> Result<PathBuf, SessionError> {
    let episodes = collect_episodes(storage, &request.refs)?;
    let num_episodes = episodes.len();
    let options = MergerOptions {
        strip_internal_metadata: request.strip_internal_metadata,
        end_of_episode_tags: request.end_of_episode_tags.clone(),
        add_step_tags_as_metadata: true,
        prefetch: config.merger_prefetch,
    };
    let mut merger = Merger::new(episodes, Arc::clone(factory), options)?;

    let download_dir = config.download_dir();
    fs::create_dir_all(&download_dir)?;
    let download_id = uuid::Uuid::new_v4().simple().to_string();
    let staging = if request.archive { Some(tempfile::tempdir()?) } else { None };
    let data_dir = match &staging {
        Some(dir) => dir.path().to_path_buf(),
        None => download_dir.join(&download_id),
    };

    let mut writer = factory.create_writer(
        &config.episode_storage_kind,
        &data_dir,
        merger.specs().clone(),
        Metadata::new(),
    )?;
    let mut processed = 0_usize;
    while !merger.done() {
        writer.start_episode()?;
        let mut timestep = merger.reset()?;
        writer.record_step(StepData::new(timestep.clone(), Value::Null, merger.custom_data().clone()))?;
        while !timestep.last() {
            let action = merger.next_action().cloned().unwrap_or(Value::Null);
            timestep = merger.step(&action)?;
            writer.record_step(StepData::new(timestep.clone(), action, merger.custom_data().clone()))?;
        }
        writer.end_episode(merger.episode_metadata().clone())?;
        processed += 1;
        progress(100.0 * processed as f64 / num_episodes as f64);
    }
    writer.close()?;
    merger.close();

    let location = match staging {
        Some(dir) => {
            let archive = download_dir.join(format!("{download_id}.zip"));
            create_archive(&archive, dir.path())?;
            archive
        }
        None => data_dir,
    };
    info!("Exported {num_episodes} episode(s) to {}", location.display());
    Ok(location)
}
