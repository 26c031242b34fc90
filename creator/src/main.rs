#![deny(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use episode::User;
use session::SessionConfig;
use std::io;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "creator", version, about = "Record episodes of operators controlling environments")]
struct Cli {
    /// Log debug messages.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one operator with JSON lines on stdin and stdout.
    Serve {
        /// JSON file with the list of studies to offer.
        #[arg(long)]
        studies: PathBuf,

        /// JSON file with the session settings.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Email of the operator.
        #[arg(long)]
        email: String,
    },
    /// Run proxied environments, speaking the proxy protocol on stdin and
    /// stdout.
    Worker,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // Stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Command::Serve { studies, config, email } => {
            let config = match config {
                Some(path) => SessionConfig::load(&path)?,
                None => SessionConfig::default(),
            };
            let storage = creator::load_studies(&studies)?;
            creator::run_session(io::stdin().lock(), io::stdout(), User::new(email), config, storage)
        }
        Command::Worker => creator::run_worker(),
    }
}
