use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use nus_console_lib::commands::{self, Command};
use nus_console_lib::config::ConsoleConfig;
use nus_console_lib::console::{ConsoleRecord, LogSink, StdoutSink};
use nus_console_lib::core::bluetooth::{BluestTransport, LINK_CHECK_INTERVAL_SECS};
use nus_console_lib::logging;
use nus_console_lib::state::AppState;

/// Interactive console for Nordic UART Service devices
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scan duration in seconds
    #[arg(long)]
    scan_timeout: Option<u64>,

    /// Scan, then connect to this address on startup
    #[arg(long)]
    connect: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => Some(path),
        None => ConsoleConfig::default_path().ok(),
    };
    let mut config = match &config_path {
        Some(path) => ConsoleConfig::load_config(path).await?,
        None => ConsoleConfig::default(),
    };
    if let Some(secs) = args.scan_timeout {
        config.scan_timeout_secs = secs;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    logging::init(&config.log_level);

    let sink: Arc<dyn LogSink> = Arc::new(StdoutSink::new(config.timestamps));
    info!("Initializing Bluetooth transport...");
    let transport = BluestTransport::new().await?;
    let state = AppState::new(transport, config, config_path, sink.clone());

    // One worker runs commands in the order they were typed
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Command>();
    let worker_state = state.clone();
    let worker = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            if let Err(e) = commands::execute(&worker_state, command).await {
                worker_state.sink.record(ConsoleRecord::status(e.to_string()));
            }
        }
    });

    sink.record(ConsoleRecord::status("Status: Idle. Type /help for commands."));
    if let Some(address) = args.connect {
        let _ = command_tx.send(Command::Scan(None));
        let _ = command_tx.send(Command::Connect(address));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut link_check = tokio::time::interval(Duration::from_secs(LINK_CHECK_INTERVAL_SECS));
    link_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if command == Command::Disconnect {
                            state.interrupt();
                        }
                        if command_tx.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => sink.record(ConsoleRecord::status(e.to_string())),
                }
            }
            _ = link_check.tick() => {
                if state.request_link_check() {
                    let _ = command_tx.send(Command::CheckLink);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }

    state.interrupt();
    drop(command_tx);
    if let Err(e) = worker.await {
        debug!("Command worker ended abnormally: {}", e);
    }
    state.disconnect().await;
    info!("Exiting");
    Ok(())
}
