use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SCAN_DURATION_SECS, SessionSettings,
    WriteMode,
};
use crate::core::payload::{Encoding, LineEnding};
use crate::utils::ensure_parent_dir;

pub const CONFIG_FILE_NAME: &str = "console_config.json";
const APP_DIR_NAME: &str = "nus-console";

/// What a send puts on the wire and how
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSettings {
    pub encoding: Encoding,
    pub line_ending: LineEnding,
    pub write_mode: WriteMode,
}

/// Console settings, persisted as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Character encoding for outbound text
    pub encoding: Encoding,
    /// Appended to every outbound line
    pub line_ending: LineEnding,
    /// Acknowledged or unacknowledged writes
    pub write_mode: WriteMode,
    /// Subscribe to the RX characteristic as soon as roles are known
    pub auto_subscribe: bool,
    /// Prefix console records with a local timestamp
    pub timestamps: bool,
    pub scan_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Link attempts per connect, within the connect timeout
    pub connect_attempts: u32,
    /// Devices advertising this name are listed first after a scan
    pub preferred_name: Option<String>,
    /// Used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            encoding: Encoding::Utf8,
            line_ending: LineEnding::None,
            write_mode: WriteMode::WithResponse,
            auto_subscribe: true,
            timestamps: true,
            scan_timeout_secs: DEFAULT_SCAN_DURATION_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            preferred_name: None,
            log_level: "warn".to_string(),
        }
    }
}

impl ConsoleConfig {
    /// `<platform config dir>/nus-console/console_config.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("No config directory on this platform"))?;
        Ok(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the config from a configuration file.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        ensure_parent_dir(file_path).await?;
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize console config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Console config saved to {:?}.", file_path_str);
        Ok(())
    }

    pub fn outbound(&self) -> OutboundSettings {
        OutboundSettings {
            encoding: self.encoding,
            line_ending: self.line_ending,
            write_mode: self.write_mode,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            scan_timeout: Duration::from_secs(self.scan_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            connect_attempts: self.connect_attempts,
            auto_subscribe: self.auto_subscribe,
            preferred_name: self.preferred_name.clone(),
        }
    }

    /// Applies a `key value` pair typed at the console
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "encoding" => self.encoding = value.parse().map_err(|e: String| anyhow!(e))?,
            "line_ending" | "line-ending" | "eol" => {
                self.line_ending = value.parse().map_err(|e: String| anyhow!(e))?
            }
            "write_mode" | "write-mode" | "mode" => {
                self.write_mode = value.parse().map_err(|e: String| anyhow!(e))?
            }
            "auto_subscribe" | "auto-subscribe" => self.auto_subscribe = parse_flag(value)?,
            "timestamps" => self.timestamps = parse_flag(value)?,
            "scan_timeout" | "scan_timeout_secs" => self.scan_timeout_secs = value.parse()?,
            "connect_timeout" | "connect_timeout_secs" => self.connect_timeout_secs = value.parse()?,
            "connect_attempts" => {
                self.connect_attempts = match value.parse()? {
                    0 => bail!("connect_attempts must be at least 1"),
                    n => n,
                }
            }
            "preferred_name" => {
                self.preferred_name = match value {
                    "" | "none" => None,
                    name => Some(name.to_string()),
                }
            }
            "log_level" => {
                crate::logging::parse_level(value)?;
                self.log_level = value.trim().to_ascii_lowercase();
            }
            other => bail!("unknown option: {}", other),
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => bail!("expected true or false, got {}", other),
    }
}
