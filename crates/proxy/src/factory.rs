use crate::channel::Endpoint;
use crate::proxy::{EnvironmentProxy, ProxyConfig, ThreadWorker, WorkerHandle};
use crate::worker::serve;
use environment::{EnvError, Environment, EnvironmentFactory, EnvironmentSpec};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Where proxied environments run.
#[derive(Clone)]
pub enum WorkerLaunch {
    /// A child process speaking the protocol on its stdio, started as
    /// `<program> <args...>`.
    Process { program: PathBuf, args: Vec<String> },
    /// A worker thread of this process that creates environments with the
    /// given factory.
    Thread(Arc<dyn EnvironmentFactory>),
}

/// An [`EnvironmentFactory`] that wraps every environment in an
/// [`EnvironmentProxy`] with its own worker.
pub struct ProxiedFactory {
    launch: WorkerLaunch,
    config: ProxyConfig,
}

impl ProxiedFactory {
    #[must_use]
    pub fn new(launch: WorkerLaunch, config: ProxyConfig) -> Self {
        Self { launch, config }
    }

    /// Workers are started as `<program> worker`.
    #[must_use]
    pub fn process(program: impl Into<PathBuf>, config: ProxyConfig) -> Self {
        Self::new(
            WorkerLaunch::Process { program: program.into(), args: vec!["worker".into()] },
            config,
        )
    }

    #[must_use]
    pub fn thread(factory: Arc<dyn EnvironmentFactory>, config: ProxyConfig) -> Self {
        Self::new(WorkerLaunch::Thread(factory), config)
    }

    fn launch(&self) -> Result<(Endpoint, Box<dyn WorkerHandle>), EnvError> {
        match &self.launch {
            WorkerLaunch::Process { program, args } => {
                let mut child = std::process::Command::new(program)
                    .args(args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .map_err(|e| {
                        EnvError::Channel(format!("failed to start {}: {e}", program.display()))
                    })?;
                let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
                    let _ = child.kill();
                    return Err(EnvError::Channel("worker stdio is not piped".into()));
                };
                info!(pid = child.id(), "Started environment worker process");
                let endpoint = Endpoint::from_streams(stdout, stdin)?;
                Ok((endpoint, Box::new(child)))
            }
            WorkerLaunch::Thread(factory) => {
                let (local, remote) = Endpoint::pair();
                let factory = Arc::clone(factory);
                let handle = thread::Builder::new()
                    .name("environment-worker".into())
                    .spawn(move || {
                        if let Err(e) = serve(&remote, factory.as_ref()) {
                            warn!("Environment worker stopped: {e}");
                        }
                    })
                    .map_err(|e| EnvError::Channel(e.to_string()))?;
                Ok((local, Box::new(ThreadWorker::new(handle))))
            }
        }
    }
}

impl EnvironmentFactory for ProxiedFactory {
    fn create(&self, spec: &EnvironmentSpec) -> Result<Box<dyn Environment>, EnvError> {
        let (endpoint, worker) = self.launch()?;
        let proxy = EnvironmentProxy::connect(endpoint, Some(worker), spec, self.config)?;
        Ok(Box::new(proxy))
    }
}
