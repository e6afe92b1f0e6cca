//! `trawl` command line front end.
//!
//! Loads the configuration and the backends file, runs one command across
//! the selected backends and exits with a code describing the worst failure.

mod app;
mod cli;
mod commands;
mod exit;
mod output;
mod prompt;

use anyhow::Context;
use app::App;
use clap::Parser;
use cli::Cli;
use exit::ExitStatus;
use output::Output;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};
use trawl_backend::{BackendEnv, FileStorage};
use trawl_browser::ReqwestTransport;
use trawl_core::AppConfig;

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = match verbose {
        0 => "warn,trawl=info",
        1 => "info,trawl=debug",
        _ => "debug,trawl=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitStatus> {
    let config = match AppConfig::load_with_env(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ExitStatus::Configuration);
        }
    };

    let backends_path = match cli.backends_file {
        Some(path) => path,
        None => config.backends_path()?,
    };
    let states_dir = AppConfig::states_dir()?;
    debug!(backends = %backends_path.display(), states = %states_dir.display(), "resolved paths");

    let env = BackendEnv {
        browser: config.browser.clone(),
        auth: config.auth.clone(),
        transport: Arc::new(
            ReqwestTransport::new(config.browser.timeout()).context("failed to build HTTP client")?,
        ),
        storage: Arc::new(FileStorage::new(states_dir)),
    };

    let format = cli.formatter.map_or(config.general.formatter, Into::into);
    let output = Output::stdio(format, cli.count);
    let interactive = config.general.interactive && !cli.non_interactive;

    let mut app = match App::new(&config, backends_path, env, output, Box::new(prompt::terminal())) {
        Ok(app) => app.select(cli.backends).interactive(interactive),
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ExitStatus::from(e.kind()));
        }
    };

    app.run(cli.command).await?;
    Ok(app.status())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Bug: {e:#}");
            ExitStatus::Bug.into()
        }
    }
}
