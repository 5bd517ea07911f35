use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::thread;

use clap::Parser;
use inkstream::{prewarm_highlighting, RenderConfig};
use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;
use tracing::{error, info};
use workspace_agent::console::stdin_source;
use workspace_agent::provider::transport_from_config;
use workspace_agent::{AgentConfig, AgentSession, Cli, FatalStartupError};

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FatalStartupError> {
    let launch_dir = std::env::current_dir().map_err(|error| FatalStartupError::WorkspaceRoot {
        path: ".".into(),
        reason: error.to_string(),
    })?;
    let config = AgentConfig::from_cli(cli, &launch_dir, std::env::var("RUST_LOG").ok())?;
    workspace_agent::logging::init(&config.log_filter, config.log_file.as_deref())?;

    let _ = thread::Builder::new()
        .name("markdown-highlight-prewarm".to_string())
        .spawn(prewarm_highlighting);

    let transport = transport_from_config(&config)?;
    let renderer = RenderConfig::from_env().stream_renderer();
    let mut session = AgentSession::new(config, transport, renderer)?;
    install_interrupt_handler(&session);

    let mut input = stdin_source();
    if let Err(error) = session.run(input.as_mut()) {
        error!(%error, "input loop failed");
        eprintln!("Error: {error}");
    }
    info!("session ended");
    Ok(())
}

/// Ctrl-C cancels the active turn, or exits cleanly at the prompt.
fn install_interrupt_handler<T: inkstream::Terminal>(session: &AgentSession<T>) {
    let interrupt = session.interrupt_handle();
    let turn_active = session.turn_active_handle();
    let mut signals = match Signals::new([SIGINT]) {
        Ok(signals) => signals,
        Err(error) => {
            error!(%error, "failed to install SIGINT handler");
            return;
        }
    };

    let spawned = thread::Builder::new()
        .name("workspace-agent-signals".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                if turn_active.load(Ordering::Acquire) {
                    interrupt.store(true, Ordering::Release);
                    continue;
                }
                let mut stdout = io::stdout();
                let _ = stdout.write_all(b"\r\nGoodbye!\r\n");
                let _ = stdout.flush();
                std::process::exit(0);
            }
        });
    if let Err(error) = spawned {
        error!(%error, "failed to spawn signal thread");
    }
}
