use environment::{Action, EnvError, EnvironmentSpec, ErrorKind, Keys, UserInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The fixed operation set understood by the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Init,
    KeysToAction,
    UserInputToAction,
    Render,
    SetCamera,
    Metadata,
    Reset,
    Step,
    ObservationSpec,
    ActionSpec,
    Close,
    Quit,
}

impl Opcode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Init => "INIT",
            Opcode::KeysToAction => "KEYS_TO_ACTION",
            Opcode::UserInputToAction => "USER_INPUT_TO_ACTION",
            Opcode::Render => "RENDER",
            Opcode::SetCamera => "SET_CAMERA",
            Opcode::Metadata => "METADATA",
            Opcode::Reset => "RESET",
            Opcode::Step => "STEP",
            Opcode::ObservationSpec => "OBSERVATION_SPEC",
            Opcode::ActionSpec => "ACTION_SPEC",
            Opcode::Close => "CLOSE",
            Opcode::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opcode together with its argument, as sent to the worker.
///
/// On the wire this is `{"op": "STEP", "arg": ...}`; opcodes without an
/// argument omit `arg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Init(EnvironmentSpec),
    KeysToAction(Keys),
    UserInputToAction(UserInput),
    Render,
    SetCamera(u32),
    Metadata,
    Reset,
    Step(Action),
    ObservationSpec,
    ActionSpec,
    Close,
    Quit,
}

impl Command {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Init(_) => Opcode::Init,
            Command::KeysToAction(_) => Opcode::KeysToAction,
            Command::UserInputToAction(_) => Opcode::UserInputToAction,
            Command::Render => Opcode::Render,
            Command::SetCamera(_) => Opcode::SetCamera,
            Command::Metadata => Opcode::Metadata,
            Command::Reset => Opcode::Reset,
            Command::Step(_) => Opcode::Step,
            Command::ObservationSpec => Opcode::ObservationSpec,
            Command::ActionSpec => Opcode::ActionSpec,
            Command::Close => Opcode::Close,
            Command::Quit => Opcode::Quit,
        }
    }
}

/// An [`EnvError`] flattened to plain data so it can cross the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn into_error(self) -> EnvError {
        EnvError::from_parts(self.kind, self.message)
    }
}

impl From<&EnvError> for ErrorEnvelope {
    fn from(err: &EnvError) -> Self {
        Self { kind: err.kind(), message: err.detail() }
    }
}

/// The worker's answer to exactly one [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Ok(Value),
    Err(ErrorEnvelope),
}
