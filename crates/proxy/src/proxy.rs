use crate::channel::Endpoint;
use crate::command::{Command, Reply};
use environment::{
    Action, ArraySpec, Camera, EnvError, Environment, EnvironmentSpec, Image, Keys, Metadata,
    TimeStep, UserInput,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::process::Child;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyConfig {
    /// How long a call waits for the worker's reply.
    pub recv_timeout: Duration,
    /// How long teardown waits for the worker to exit after `QUIT`.
    pub termination_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { recv_timeout: Duration::from_secs(60), termination_timeout: Duration::from_secs(10) }
    }
}

/// Whatever runs the worker loop on the other side of the channel.
pub trait WorkerHandle: Send {
    /// Waits up to `timeout` for the worker to exit; `true` if it did.
    fn wait_timeout(&mut self, timeout: Duration) -> bool;

    fn terminate(&mut self);
}

impl WorkerHandle for Child {
    fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_wait() {
                Ok(Some(status)) => {
                    debug!("Worker process exited with {status}");
                    return true;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => return false,
                Err(e) => {
                    warn!("Polling the worker process failed: {e}");
                    return false;
                }
            }
        }
    }

    fn terminate(&mut self) {
        if let Err(e) = self.kill() {
            warn!("Killing the worker process failed: {e}");
        }
        let _ = self.wait();
    }
}

/// A worker loop running on a thread of this process.
pub struct ThreadWorker(Option<JoinHandle<()>>);

impl ThreadWorker {
    #[must_use]
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(Some(handle))
    }
}

impl WorkerHandle for ThreadWorker {
    fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.0.as_ref() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        if let Some(handle) = self.0.take() {
            let _ = handle.join();
        }
        true
    }

    /// Threads cannot be killed; the worker is detached instead.
    fn terminate(&mut self) {
        if self.0.take().is_some() {
            warn!("Detaching unresponsive worker thread");
        }
    }
}

struct Link {
    endpoint: Endpoint,
    broken: bool,
}

/// An [`Environment`] whose implementation runs behind a channel.
///
/// Only one call is in flight at a time: the link is locked for the whole
/// send and receive. A failure of the channel itself (timeout, closed
/// channel, undecodable reply) breaks the proxy and every later call fails
/// immediately.
pub struct EnvironmentProxy {
    link: Mutex<Link>,
    worker: Option<Box<dyn WorkerHandle>>,
    config: ProxyConfig,
}

impl EnvironmentProxy {
    /// Connects to a worker and initializes its environment from `spec`.
    pub fn connect(
        endpoint: Endpoint,
        worker: Option<Box<dyn WorkerHandle>>,
        spec: &EnvironmentSpec,
        config: ProxyConfig,
    ) -> Result<Self, EnvError> {
        let proxy = Self { link: Mutex::new(Link { endpoint, broken: false }), worker, config };
        proxy.call::<()>(Command::Init(spec.clone()))?;
        info!(id = %spec.id, "Environment proxy connected");
        Ok(proxy)
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.link.lock().broken
    }

    fn call<T: DeserializeOwned>(&self, command: Command) -> Result<T, EnvError> {
        let opcode = command.opcode();
        let mut link = self.link.lock();
        if link.broken {
            return Err(EnvError::Channel("environment proxy is broken".into()));
        }
        debug!(%opcode, "Sending command");
        let reply = link
            .endpoint
            .send(&command)
            .and_then(|()| link.endpoint.recv_timeout::<Reply>(self.config.recv_timeout));
        let value = match reply {
            Ok(Reply::Ok(value)) => value,
            Ok(Reply::Err(envelope)) => return Err(envelope.into_error()),
            Err(e) => {
                warn!(%opcode, "Environment proxy failed: {e}");
                link.broken = true;
                return Err(e);
            }
        };
        debug!(%opcode, "Received reply");
        serde_json::from_value(value).map_err(|e| {
            link.broken = true;
            EnvError::Channel(format!("unexpected reply to {opcode}: {e}"))
        })
    }
}

impl Environment for EnvironmentProxy {
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        self.call(Command::Reset)
    }

    fn step(&mut self, action: &Action) -> Result<TimeStep, EnvError> {
        self.call(Command::Step(action.clone()))
    }

    fn render(&mut self) -> Result<Image, EnvError> {
        self.call(Command::Render)
    }

    fn observation_spec(&self) -> Result<ArraySpec, EnvError> {
        self.call(Command::ObservationSpec)
    }

    fn action_spec(&self) -> Result<ArraySpec, EnvError> {
        self.call(Command::ActionSpec)
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.call(Command::Close)
    }

    fn metadata(&self) -> Result<Metadata, EnvError> {
        self.call(Command::Metadata)
    }

    fn set_camera(&mut self, index: u32) -> Result<Option<Camera>, EnvError> {
        self.call(Command::SetCamera(index))
    }

    fn keys_to_action(&mut self, keys: &Keys) -> Result<Option<Action>, EnvError> {
        self.call(Command::KeysToAction(keys.clone()))
    }

    fn map_input(&mut self, input: &UserInput) -> Result<Option<Action>, EnvError> {
        self.call(Command::UserInputToAction(input.clone()))
    }
}

impl Drop for EnvironmentProxy {
    fn drop(&mut self) {
        let link = self.link.get_mut();
        if link.endpoint.send(&Command::Quit).is_ok() && !link.broken {
            if let Err(e) = link.endpoint.recv_timeout::<Reply>(self.config.termination_timeout) {
                debug!("No reply to QUIT: {e}");
            }
        }
        if let Some(mut worker) = self.worker.take() {
            if !worker.wait_timeout(self.config.termination_timeout) {
                warn!("Worker did not exit in {:?}; terminating", self.config.termination_timeout);
                worker.terminate();
            }
        }
    }
}
