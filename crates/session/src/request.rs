//! Messages exchanged with the operator's client.
//!
//! Both directions are tagged unions with a `type` field, e.g.
//! `{"type": "select_study", "study_id": "..."}`. Binary payloads such as
//! rendered frames travel as base64 strings.

use environment::{EnvironmentSpec, Quality};
use episode::{Episode, EpisodeRef, StudySpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// State of a gamepad as reported by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamepadInput {
    pub id: String,
    /// Pressed buttons by index and their values in `(0, 1]`.
    pub buttons: BTreeMap<String, f32>,
    pub axes: BTreeMap<String, f32>,
}

impl GamepadInput {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.buttons.is_empty() || !self.axes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadRequest {
    pub refs: Vec<EpisodeRef>,
    /// Deliver a zip archive instead of a directory.
    pub archive: bool,
    pub end_of_episode_tags: Vec<String>,
    pub strip_internal_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    SetStudies,
    SelectStudy {
        study_id: String,
    },
    SaveStudy {
        study: StudySpec,
    },
    EnableStudy {
        study_id: String,
        enable: bool,
    },
    SelectEnvironment {
        env_id: String,
    },
    Action {
        /// Names of the pressed keys, as reported by the browser.
        #[serde(default)]
        keys: Vec<String>,
        #[serde(default)]
        gamepad: GamepadInput,
    },
    SaveEpisode {
        accept: bool,
        #[serde(default)]
        mark_as_completed: bool,
    },
    DeleteEpisode {
        #[serde(rename = "ref")]
        reference: EpisodeRef,
    },
    SetCamera {
        index: u32,
    },
    SetFps {
        fps: f64,
    },
    SetQuality {
        quality: Quality,
    },
    ReplayEpisode {
        #[serde(rename = "ref")]
        reference: EpisodeRef,
    },
    ReplayStep {
        index: usize,
    },
    AddEpisodeTag {
        tag: String,
    },
    RemoveEpisodeTag {
        tag: String,
    },
    UpdateReplayEpisode {
        #[serde(default)]
        notes: String,
    },
    AddStepTag {
        index: usize,
        tag: String,
    },
    RemoveStepTag {
        index: usize,
        tag: String,
    },
    DownloadEpisodes(DownloadRequest),
}

/// An episode as listed to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub study: StudySpec,
    /// `None` for episodes replayed from a file.
    pub env: Option<EnvironmentSpec>,
    pub episode: Episode,
    /// Human readable duration, e.g. "2 minutes".
    pub duration: String,
    pub video_url: Option<String>,
    /// Capitalised episode state, e.g. "Completed".
    pub status: String,
    pub can_delete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Base64 PNG.
    pub image: String,
}

/// A replayed observation or action. Image-like values are sent as PNG
/// images, everything else as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<NamedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_encoded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Config {
        config: Value,
    },
    SetStudies {
        studies: Vec<StudySpec>,
    },
    SelectStudy {
        study: StudySpec,
    },
    Episodes {
        episodes: Vec<EpisodeMetadata>,
    },
    SaveStudy,
    EnableStudy {
        study_id: String,
        enabled: bool,
    },
    SelectEnvironment {
        study_id: String,
        env: EnvironmentSpec,
    },
    Step {
        /// Base64 JPEG of the current frame.
        image: Option<String>,
        /// Number of episodes started in the current run.
        episode_index: u64,
        episode_steps: usize,
        reward: f64,
    },
    Pause {
        paused: bool,
    },
    ConfirmSave {
        mark_as_completed: bool,
    },
    SaveEpisode {
        episode: Box<EpisodeMetadata>,
    },
    DeleteEpisode {
        #[serde(rename = "ref")]
        reference: EpisodeRef,
        success: bool,
    },
    SetCamera {
        index: u32,
        name: String,
    },
    ReplayEpisode {
        episode: Box<EpisodeMetadata>,
        /// Rewards of every step including the first; missing rewards are 0.
        step_rewards: Vec<f64>,
    },
    ReplayStep {
        index: usize,
        image: Option<Value>,
        keys: Option<Value>,
        reward: Option<f64>,
        observation: Data,
        action: Data,
        tags: Vec<String>,
    },
    AddEpisodeTag {
        tag: String,
        success: bool,
    },
    RemoveEpisodeTag {
        tag: String,
        success: bool,
    },
    UpdateReplayEpisode {
        success: bool,
    },
    AddStepTag {
        index: usize,
        tag: String,
        success: bool,
    },
    RemoveStepTag {
        index: usize,
        tag: String,
        success: bool,
    },
    DownloadEpisodes {
        progress: f64,
        /// Location of the export, only in the final response.
        url: Option<String>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_are_tagged_by_type() {
        let request: Request = serde_json::from_value(json!({
            "type": "action",
            "keys": ["ArrowLeft"],
            "gamepad": { "id": "SpaceMouse Wireless", "axes": { "0": 0.5 } }
        }))
        .unwrap();
        let Request::Action { keys, gamepad } = request else {
            panic!("not an action");
        };
        assert_eq!(keys, vec!["ArrowLeft"]);
        assert!((gamepad.axes["0"] - 0.5).abs() < f32::EPSILON);
        assert!(gamepad.is_active());

        let request: Request = serde_json::from_value(json!({
            "type": "download_episodes",
            "refs": [{ "study_id": "s", "session_id": "x", "episode_id": "1.0" }],
            "archive": true
        }))
        .unwrap();
        assert!(matches!(request, Request::DownloadEpisodes(DownloadRequest { archive: true, .. })));

        let request: Request = serde_json::from_value(json!({ "type": "set_quality", "quality": "high" })).unwrap();
        assert_eq!(request, Request::SetQuality { quality: Quality::High });
    }

    #[test]
    fn responses_serialize_with_type() {
        let value = serde_json::to_value(Response::Pause { paused: true }).unwrap();
        assert_eq!(value, json!({ "type": "pause", "paused": true }));
        let value = serde_json::to_value(Response::SaveStudy).unwrap();
        assert_eq!(value, json!({ "type": "save_study" }));
    }
}
