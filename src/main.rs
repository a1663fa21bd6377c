mod app;
mod app_paths;
mod config;
mod context;
mod decisions;
mod discovery;
mod dispatch;
mod logging;
mod platform;
mod prompt;
mod recipient;
mod send_time;
mod session;
mod shutdown;
mod stream;
mod structured_logger;
mod trigger;

use anyhow::{Context, Result};
use app::{App, AppOptions};
use clap::Parser;
use decisions::DecisionProvider;
use logging::console;
use platform::bridge::{BridgePlatform, DEFAULT_BRIDGE_ADDR};
use prompt::TerminalDecisions;
use session::UserExit;
use shutdown::{Shutdown, ShutdownReason};
use std::path::PathBuf;
use std::sync::Arc;
use structured_logger::StructuredLogger;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("AUTO_MESSENGER_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "auto-messenger")]
#[command(about = "Log in to your messenger account and send one message at a randomized time")]
#[command(version = VERSION)]
struct Cli {
    /// Config file (defaults to ~/.auto-messenger/config.txt)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Saved login session file (defaults to ~/.auto-messenger/app-state.json)
    #[arg(long)]
    app_state: Option<PathBuf>,

    /// Address of the messenger bridge
    #[arg(long, env = "AUTO_MESSENGER_BRIDGE", default_value = DEFAULT_BRIDGE_ADDR)]
    bridge: String,

    /// More diagnostics on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Exit right away instead of waiting for Enter
    #[arg(long)]
    no_exit_prompt: bool,
}

enum Outcome {
    Finished(Result<()>),
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let code = run(cli).await?;
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let options = AppOptions {
        config_path: match cli.config {
            Some(path) => path,
            None => app_paths::config_path()?,
        },
        app_state_path: match cli.app_state {
            Some(path) => path,
            None => app_paths::app_state_path()?,
        },
    };

    let logger = Arc::new(open_event_log());
    let shutdown = Arc::new(Shutdown::new(logger.clone()));
    let decisions: Arc<dyn DecisionProvider> = Arc::new(TerminalDecisions::new());
    let platform = BridgePlatform::new(cli.bridge);
    tracing::debug!(
        bridge = platform.address(),
        run_id = logger.run_id(),
        event_log = ?logger.path(),
        "starting"
    );

    let app = App::new(
        options,
        Arc::new(platform),
        decisions.clone(),
        logger,
        shutdown.clone(),
    );

    let outcome = tokio::select! {
        result = app.run() => Outcome::Finished(result),
        signal = wait_for_interrupt() => {
            signal?;
            Outcome::Interrupted
        }
    };

    let (reason, code) = match outcome {
        Outcome::Interrupted => {
            console::blank();
            shutdown.run(ShutdownReason::Interrupted).await;
            return Ok(0);
        }
        Outcome::Finished(Ok(())) => (ShutdownReason::MessageSent, 0),
        Outcome::Finished(Err(e)) => match e.downcast_ref::<UserExit>() {
            Some(exit) => {
                console::info(&exit.reason);
                (ShutdownReason::UserExit, 0)
            }
            None => {
                tracing::error!(error = %format!("{:#}", e), "run failed");
                console::error(&format!("Error: {:#}", e));
                (ShutdownReason::Error, 1)
            }
        },
    };

    shutdown.run(reason).await;

    if !cli.no_exit_prompt {
        tokio::select! {
            answer = decisions.wait_for_exit() => {
                if let Err(e) = answer {
                    tracing::debug!(error = %e, "exit prompt failed");
                }
            }
            _ = wait_for_interrupt() => {}
        }
    }

    Ok(code)
}

fn open_event_log() -> StructuredLogger {
    match app_paths::logs_dir().and_then(|dir| StructuredLogger::new(&dir)) {
        Ok(logger) => logger,
        Err(e) => {
            tracing::warn!(error = %e, "event log disabled");
            StructuredLogger::disabled()
        }
    }
}

#[cfg(unix)]
async fn wait_for_interrupt() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;

    tokio::select! {
        _ = sigint.recv() => tracing::debug!("SIGINT received"),
        _ = sigterm.recv() => tracing::debug!("SIGTERM received"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_interrupt() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}
