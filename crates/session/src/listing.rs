//! How episodes are presented to the operator.

use crate::request::EpisodeMetadata;
use crate::sink::ResponseSink;
use environment::EnvironmentSpec;
use episode::policy::can_delete_episode;
use episode::{Episode, EpisodeState, StudySpec};
use std::path::Path;

/// Episode metadata key of the recorded video.
pub const VIDEO_FILE_KEY: &str = "video_file";

/// A rough, human readable rendition of a duration, e.g. "3 minutes".
#[must_use]
pub fn natural_duration(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    let (count, one, unit) = match secs {
        0 => return "a moment".to_string(),
        1..=59 => (secs, "a second", "seconds"),
        60..=3599 => (secs / 60, "a minute", "minutes"),
        3600..=86_399 => (secs / 3600, "an hour", "hours"),
        _ => (secs / 86_400, "a day", "days"),
    };
    if count == 1 {
        one.to_string()
    } else {
        format!("{count} {unit}")
    }
}

#[must_use]
pub fn status(state: EpisodeState) -> &'static str {
    match state {
        EpisodeState::Active => "Active",
        EpisodeState::Completed => "Completed",
        EpisodeState::Cancelled => "Cancelled",
        EpisodeState::Rejected => "Rejected",
        EpisodeState::Abandoned => "Abandoned",
    }
}

pub fn episode_metadata(
    study: &StudySpec,
    env: Option<&EnvironmentSpec>,
    episode: &Episode,
    email: &str,
    sink: &dyn ResponseSink,
) -> EpisodeMetadata {
    let video_url = episode
        .metadata
        .get(VIDEO_FILE_KEY)
        .and_then(|v| v.as_str())
        .and_then(|path| sink.url_for_path(Path::new(path)));
    EpisodeMetadata {
        study: study.clone(),
        env: env.cloned(),
        episode: episode.clone(),
        duration: natural_duration(episode.duration_secs()),
        video_url,
        status: status(episode.state).to_string(),
        can_delete: can_delete_episode(episode, email),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_read_naturally() {
        assert_eq!(natural_duration(0.2), "a moment");
        assert_eq!(natural_duration(1.0), "a second");
        assert_eq!(natural_duration(42.0), "42 seconds");
        assert_eq!(natural_duration(61.0), "a minute");
        assert_eq!(natural_duration(600.0), "10 minutes");
        assert_eq!(natural_duration(7200.0), "2 hours");
        assert_eq!(natural_duration(3.0 * 86_400.0), "3 days");
    }
}
