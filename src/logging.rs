use std::io::Write;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::Local;
use log::LevelFilter;

/// Sets up `env_logger` on stderr. `RUST_LOG` wins over `default_level`.
///
/// Without `RUST_LOG` the logger itself passes everything and the level is
/// held by `log::max_level`, so `set_level` can move it later.
pub fn init(default_level: &str) {
    let level = LevelFilter::from_str(default_level).unwrap_or(LevelFilter::Warn);
    let from_env = std::env::var_os("RUST_LOG").is_some();

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        });

    if builder.try_init().is_err() {
        eprintln!("Logger already initialized");
        return;
    }
    if !from_env {
        log::set_max_level(level);
    }
    log::info!("Logging initialized at {}", log::max_level());
}

/// Changes the level at runtime. With `RUST_LOG` set, records its
/// directives filter out stay filtered.
pub fn set_level(level: &str) -> Result<LevelFilter> {
    let level = parse_level(level)?;
    log::set_max_level(level);
    Ok(level)
}

pub fn parse_level(level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(level.trim()).map_err(|_| anyhow!("unknown log level: {}", level))
}
