use anyhow::{Context, Result};
use environment::{BuiltinFactory, EnvironmentFactory};
use episode::policy::validate_study_spec;
use episode::{MemoryStorage, Storage, StudySpec, User};
use parking_lot::Mutex;
use proxy::{Endpoint, ProxiedFactory, ProxyConfig};
use session::{
    ResponseSink, Request, Response, SessionConfig, SessionContext, SessionController,
};
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Writes every response as one JSON line.
pub struct LineSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl<W: Write + Send> ResponseSink for LineSink<W> {
    fn send(&self, response: Response) -> bool {
        let line = match serde_json::to_string(&response) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode a response: {e}");
                return false;
            }
        };
        let mut out = self.out.lock();
        match writeln!(out, "{line}").and_then(|()| out.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send a response: {e}");
                false
            }
        }
    }

    fn url_for_path(&self, path: &Path) -> Option<String> {
        Some(format!("file://{}", path.display()))
    }
}

/// Reads a JSON list of studies into a fresh in-memory storage.
pub fn load_studies(path: &Path) -> Result<Arc<MemoryStorage>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read studies from {}", path.display()))?;
    let studies: Vec<StudySpec> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid studies in {}", path.display()))?;
    let storage = Arc::new(MemoryStorage::new());
    for study in studies {
        validate_study_spec(&study).with_context(|| format!("Invalid study {}", study.name))?;
        storage.create_study(study)?;
    }
    Ok(storage)
}

/// Environments run in-process, or in worker processes started from this
/// executable when `use_proxy` is set.
pub fn environment_factory(config: &SessionConfig) -> Result<Arc<dyn EnvironmentFactory>> {
    if config.use_proxy {
        let program = std::env::current_exe().context("Cannot locate the worker executable")?;
        info!("Environments run in worker processes of {}", program.display());
        Ok(Arc::new(ProxiedFactory::process(program, ProxyConfig::default())))
    } else {
        Ok(Arc::new(BuiltinFactory))
    }
}

/// Serves one operator: requests are read from `input` until it ends and
/// responses are written to `output`, one JSON document per line.
pub fn run_session<R, W>(
    input: R,
    output: W,
    user: User,
    config: SessionConfig,
    storage: Arc<dyn Storage>,
) -> Result<()>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let sink: Arc<dyn ResponseSink> = Arc::new(LineSink::new(output));
    let ctx = SessionContext {
        storage,
        env_factory: environment_factory(&config)?,
        episode_factory: Arc::new(episode::JsonStorageFactory),
        sink: Arc::clone(&sink),
    };
    info!(user = %user.email, "Starting session");
    let controller = SessionController::new(user, config, ctx)?;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Request>(&line) {
            Ok(request) => controller.handle_request(request),
            Err(e) => {
                warn!("Ignoring malformed request: {e}");
                sink.send(Response::Error { message: format!("Malformed request: {e}") });
            }
        }
    }
    controller.close();
    info!("Operator disconnected");
    Ok(())
}

/// Runs the proxy worker loop on standard input and output.
pub fn run_worker() -> Result<()> {
    let endpoint = Endpoint::from_streams(std::io::stdin(), std::io::stdout())?;
    let served = proxy::serve(&endpoint, &BuiltinFactory);
    // The reply to QUIT has to reach the parent before the process exits.
    endpoint.shutdown()?;
    served?;
    Ok(())
}
