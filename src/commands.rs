//! Console commands
//! Lines starting with `/` are commands; anything else is text to send.
//! Session operations report their own outcome to the sink, so the errors
//! returned here are only the ones the session never saw (bad arguments,
//! unknown options, config IO).

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use log::debug;

use crate::console::ConsoleRecord;
use crate::core::bluetooth::Transport;
use crate::core::payload;
use crate::logging;
use crate::state::AppState;

pub const HELP: &str = "\
Commands:
  /scan [secs]          scan for devices
  /devices              list devices from the last scan
  /connect <n|address>  connect to a device by list index or address
  /disconnect           disconnect (also cancels a pending connect)
  /refresh              re-enumerate services and re-map RX/TX
  /subscribe            subscribe to the RX characteristic
  /chars                list RX/TX candidates
  /rx <n>, /tx <n>      pick a different RX/TX candidate
  /set <key> <value>    encoding, line_ending, write_mode, auto_subscribe,
                        timestamps, scan_timeout, connect_timeout, ...
  /save                 write the current settings to the config file
  /status               show the session
  /help                 this text
  /quit                 disconnect and exit
Any other line is sent to the device; start it with // to send a leading /.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Scan(Option<u64>),
    Devices,
    Connect(String),
    Disconnect,
    Refresh,
    Subscribe,
    Characteristics,
    SelectRx(usize),
    SelectTx(usize),
    Set { key: String, value: String },
    Save,
    Status,
    CheckLink,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };
        if rest.starts_with('/') {
            return Ok(Self::Send(rest.to_string()));
        }

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let arg = words.next();

        let command = match name {
            "scan" => Self::Scan(arg.map(|secs| secs.parse()).transpose()?),
            "devices" => Self::Devices,
            "connect" => Self::Connect(arg.ok_or_else(|| anyhow!("usage: /connect <n|address>"))?.to_string()),
            "disconnect" => Self::Disconnect,
            "refresh" => Self::Refresh,
            "subscribe" => Self::Subscribe,
            "chars" => Self::Characteristics,
            "rx" => Self::SelectRx(arg.ok_or_else(|| anyhow!("usage: /rx <n>"))?.parse()?),
            "tx" => Self::SelectTx(arg.ok_or_else(|| anyhow!("usage: /tx <n>"))?.parse()?),
            "set" => {
                let key = arg.ok_or_else(|| anyhow!("usage: /set <key> <value>"))?;
                let value = words.collect::<Vec<_>>().join(" ");
                Self::Set {
                    key: key.to_string(),
                    value,
                }
            }
            "save" => Self::Save,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("Unknown command: /{} (try /help)", other),
        };
        Ok(command)
    }
}

/// Runs one command against the shared state
pub async fn execute<T: Transport>(state: &AppState<T>, command: Command) -> Result<()> {
    match command {
        Command::Send(text) => send_text(state, &text).await,
        Command::Scan(secs) => scan_devices(state, secs).await,
        Command::Devices => list_devices(state).await,
        Command::Connect(target) => connect_to_device(state, &target).await,
        Command::Disconnect => {
            state.disconnect().await;
            Ok(())
        }
        Command::Refresh => {
            let result = state.session.lock().await.refresh_services_and_subscribe().await;
            if let Err(e) = result {
                debug!("Refresh failed: {}", e);
            }
            Ok(())
        }
        Command::Subscribe => {
            let result = state.session.lock().await.subscribe().await;
            if let Err(e) = result {
                debug!("Subscribe failed: {}", e);
            }
            Ok(())
        }
        Command::Characteristics => list_characteristics(state).await,
        Command::SelectRx(index) => {
            state.session.lock().await.select_rx(index).await?;
            Ok(())
        }
        Command::SelectTx(index) => {
            state.session.lock().await.select_tx(index)?;
            Ok(())
        }
        Command::Set { key, value } => set_option(state, &key, &value).await,
        Command::Save => save_config(state).await,
        Command::Status => show_status(state).await,
        Command::CheckLink => {
            state.link_check_started();
            state.session.lock().await.check_link().await;
            Ok(())
        }
        Command::Help => {
            state.sink.record(ConsoleRecord::status(HELP));
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

/// Builds the payload with the settings in force right now and writes it
pub async fn send_text<T: Transport>(state: &AppState<T>, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let outbound = state.config.lock().await.outbound();
    let bytes = payload::build(text, outbound.encoding, outbound.line_ending);

    let result = state.session.lock().await.send(&bytes, outbound.write_mode).await;
    if let Err(e) = result {
        debug!("Send failed: {}", e);
    }
    Ok(())
}

pub async fn scan_devices<T: Transport>(state: &AppState<T>, secs: Option<u64>) -> Result<()> {
    let mut session = state.session.lock().await;
    let timeout = secs
        .map(Duration::from_secs)
        .unwrap_or(session.settings().scan_timeout);

    if session.scan(timeout).await.is_ok() {
        for (i, device) in session.devices().iter().enumerate() {
            state.sink.record(ConsoleRecord::status(format!("  [{}] {}", i, device)));
        }
    }
    Ok(())
}

pub async fn list_devices<T: Transport>(state: &AppState<T>) -> Result<()> {
    let session = state.session.lock().await;
    if session.devices().is_empty() {
        state.sink.record(ConsoleRecord::status("No devices. Run /scan first."));
    }
    for (i, device) in session.devices().iter().enumerate() {
        state.sink.record(ConsoleRecord::status(format!("  [{}] {}", i, device)));
    }
    Ok(())
}

/// `target` is an index into the last scan or a device address
pub async fn connect_to_device<T: Transport>(state: &AppState<T>, target: &str) -> Result<()> {
    let mut session = state.session.lock().await;

    let address = match target.parse::<usize>() {
        Ok(index) => session
            .devices()
            .get(index)
            .map(|device| device.address.clone())
            .ok_or_else(|| anyhow!("No device at index {}. Select a device first.", index))?,
        Err(_) => target.to_string(),
    };

    if let Err(e) = session.connect(&address).await {
        debug!("Connect to {} failed: {}", address, e);
    }
    Ok(())
}

pub async fn list_characteristics<T: Transport>(state: &AppState<T>) -> Result<()> {
    let session = state.session.lock().await;
    let Some(classification) = session.classification() else {
        bail!("Not connected.");
    };
    let roles = session.roles();

    let marker = |selected: bool| if selected { "*" } else { " " };
    state.sink.record(ConsoleRecord::status("RX candidates (notify/indicate):"));
    for (i, c) in classification.rx_candidates.iter().enumerate() {
        let selected = roles.rx() == Some(c);
        state
            .sink
            .record(ConsoleRecord::status(format!(" {}[{}] {}", marker(selected), i, c)));
    }
    state.sink.record(ConsoleRecord::status("TX candidates (write):"));
    for (i, c) in classification.tx_candidates.iter().enumerate() {
        let selected = roles.tx() == Some(c);
        state
            .sink
            .record(ConsoleRecord::status(format!(" {}[{}] {}", marker(selected), i, c)));
    }
    Ok(())
}

/// Updates the config and pushes the change to whoever reads it
pub async fn set_option<T: Transport>(state: &AppState<T>, key: &str, value: &str) -> Result<()> {
    let mut config = state.config.lock().await;
    config.set(key, value)?;

    state.sink.set_timestamps(config.timestamps);
    if key == "log_level" {
        logging::set_level(&config.log_level)?;
    }
    *state.session.lock().await.settings_mut() = config.session_settings();

    state
        .sink
        .record(ConsoleRecord::status(format!("{} set to {}", key, value)));
    Ok(())
}

pub async fn save_config<T: Transport>(state: &AppState<T>) -> Result<()> {
    let path = state
        .config_path
        .clone()
        .ok_or_else(|| anyhow!("No config file in use"))?;
    state.config.lock().await.save_config(&path).await?;
    state
        .sink
        .record(ConsoleRecord::status(format!("Saved settings to {}", path.display())));
    Ok(())
}

pub async fn show_status<T: Transport>(state: &AppState<T>) -> Result<()> {
    let outbound = state.config.lock().await.outbound();
    let session = state.session.lock().await;

    let mut lines = vec![format!("State: {}", session.state())];
    if let Some(info) = session.info() {
        lines.push(format!("Device: {}", info.address));
        lines.push(match info.roles.rx() {
            Some(rx) => format!(
                "RX: {} ({})",
                rx,
                if info.rx_subscribed { "subscribed" } else { "not subscribed" }
            ),
            None => "RX: not selected".to_string(),
        });
        lines.push(match info.roles.tx() {
            Some(tx) => format!("TX: {}", tx),
            None => "TX: not selected".to_string(),
        });
    }
    lines.push(format!(
        "Outbound: {} / line end {} / {}",
        outbound.encoding, outbound.line_ending, outbound.write_mode
    ));

    for line in lines {
        state.sink.record(ConsoleRecord::status(line));
    }
    Ok(())
}
