use crate::channel::Endpoint;
use crate::command::{Command, ErrorEnvelope, Reply};
use environment::{EnvError, Environment, EnvironmentFactory};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Runs the worker loop on `endpoint` until `QUIT` arrives or the channel
/// fails.
///
/// The environment is created lazily by `INIT`. Every other command is
/// routed to it and answered with exactly one [`Reply`]; failures of the
/// environment are sent back as data and do not end the loop.
pub fn serve(endpoint: &Endpoint, factory: &dyn EnvironmentFactory) -> Result<(), EnvError> {
    let mut env: Option<Box<dyn Environment>> = None;
    loop {
        let line = endpoint.recv_line()?;
        let command = match serde_json::from_str::<Command>(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring malformed command: {e}");
                let err = EnvError::Failed(format!("malformed command: {e}"));
                endpoint.send(&Reply::Err(ErrorEnvelope::from(&err)))?;
                continue;
            }
        };
        let opcode = command.opcode();
        debug!(%opcode, "Received command");
        if command == Command::Quit {
            if let Some(mut env) = env.take() {
                if let Err(e) = env.close() {
                    warn!("Closing the environment failed: {e}");
                }
            }
            endpoint.send(&Reply::Ok(Value::Bool(true)))?;
            info!("Worker quit");
            return Ok(());
        }
        let reply = match execute(&mut env, factory, command) {
            Ok(value) => Reply::Ok(value),
            Err(e) => {
                debug!(%opcode, "Command failed: {e}");
                Reply::Err(ErrorEnvelope::from(&e))
            }
        };
        endpoint.send(&reply)?;
    }
}

fn execute(
    slot: &mut Option<Box<dyn Environment>>,
    factory: &dyn EnvironmentFactory,
    command: Command,
) -> Result<Value, EnvError> {
    if let Command::Init(spec) = command {
        if let Some(mut old) = slot.take() {
            if let Err(e) = old.close() {
                warn!("Closing the previous environment failed: {e}");
            }
        }
        *slot = Some(factory.create(&spec)?);
        info!(id = %spec.id, "Worker environment initialized");
        return Ok(Value::Null);
    }
    let env = slot.as_mut().ok_or(EnvError::NotInitialized)?;
    match command {
        Command::KeysToAction(keys) => to_value(&env.keys_to_action(&keys)?),
        Command::UserInputToAction(input) => to_value(&env.map_input(&input)?),
        Command::Render => to_value(&env.render()?),
        Command::SetCamera(index) => to_value(&env.set_camera(index)?),
        Command::Metadata => to_value(&env.metadata()?),
        Command::Reset => to_value(&env.reset()?),
        Command::Step(action) => to_value(&env.step(&action)?),
        Command::ObservationSpec => to_value(&env.observation_spec()?),
        Command::ActionSpec => to_value(&env.action_spec()?),
        Command::Close => to_value(&env.close()?),
        Command::Init(_) | Command::Quit => Ok(Value::Null),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, EnvError> {
    serde_json::to_value(value).map_err(|e| EnvError::Failed(e.to_string()))
}
