use creator::*;
use episode::User;
use session::{Response, SessionConfig};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

const STUDIES: &str = r#"[
  {
    "id": "spheres",
    "name": "Spheres",
    "creator": { "email": "creator@example.com" },
    "state": "enabled",
    "environment_specs": [
      {
        "id": "sphere",
        "name": "Rolling sphere",
        "sync": true,
        "max_episode_steps": 2,
        "kind": { "family": "rolling_sphere" }
      }
    ]
  }
]"#;

#[test]
fn serves_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let studies = dir.path().join("studies.json");
    std::fs::write(&studies, STUDIES).unwrap();
    let storage = load_studies(&studies).unwrap();

    let input = [
        r#"{"type": "select_study", "study_id": "spheres"}"#,
        r#"{"type": "select_environment", "env_id": "sphere"}"#,
        "",
        r#"{"type": "action", "keys": ["ArrowRight"]}"#,
        r#"{"type": "action", "keys": ["ArrowRight"]}"#,
        r#"{"type": "save_episode", "accept": true, "mark_as_completed": true}"#,
        "not json",
    ]
    .join("\n");
    let output = SharedBuffer::default();
    let config = SessionConfig { base_log_dir: dir.path().join("logs"), ..SessionConfig::default() };
    run_session(Cursor::new(input), output.clone(), User::new("operator@example.com"), config, storage)
        .unwrap();

    let text = String::from_utf8(output.0.lock().unwrap().clone()).unwrap();
    let responses: Vec<Response> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert!(matches!(responses[0], Response::Config { .. }));
    assert!(responses.contains(&Response::ConfirmSave { mark_as_completed: true }));
    let saved = responses
        .iter()
        .find_map(|r| match r {
            Response::SaveEpisode { episode } => Some(episode),
            _ => None,
        })
        .unwrap();
    assert_eq!(saved.status, "Completed");
    assert_eq!(saved.episode.num_steps, 2);
    assert!(matches!(
        responses.last(),
        Some(Response::Error { message }) if message.starts_with("Malformed request")
    ));
}

#[test]
fn invalid_studies_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let studies = dir.path().join("studies.json");
    std::fs::write(&studies, r#"[{ "name": "Empty", "creator": { "email": "a@b" } }]"#).unwrap();
    let err = load_studies(&studies).unwrap_err();
    assert!(format!("{err:#}").contains("No environment specified."));
}
