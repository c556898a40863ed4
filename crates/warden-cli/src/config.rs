//! Runtime configuration, layered from an optional TOML file and `WARDEN_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::{Context as _, anyhow};
use chrono_tz::Tz;
use serde::Deserialize;
use warden_store_sqlite::StoreOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct WardenConfig {
  /// warden's own database; created on first run.
  pub control_path:          PathBuf,
  /// The relay's event database.
  pub event_path:            PathBuf,
  #[serde(default = "default_reader_connections")]
  pub reader_connections:    usize,
  #[serde(default = "default_read_busy_timeout_ms")]
  pub read_busy_timeout_ms:  u64,
  #[serde(default = "default_write_busy_timeout_ms")]
  pub write_busy_timeout_ms: u64,
  /// IANA timezone used for "today" and histogram buckets.
  #[serde(default = "default_timezone")]
  pub timezone:              String,
}

fn default_reader_connections() -> usize { 4 }
fn default_read_busy_timeout_ms() -> u64 { 5_000 }
fn default_write_busy_timeout_ms() -> u64 { 30_000 }
fn default_timezone() -> String { "UTC".to_owned() }

impl WardenConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = ::config::Config::builder()
      .add_source(::config::File::from(path).required(false))
      .add_source(::config::Environment::with_prefix("WARDEN"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise WardenConfig")?;
    cfg.control_path = expand_tilde(&cfg.control_path);
    cfg.event_path = expand_tilde(&cfg.event_path);
    Ok(cfg)
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      reader_connections:       self.reader_connections,
      busy_timeout:             Duration::from_millis(self.read_busy_timeout_ms),
      maintenance_busy_timeout: Duration::from_millis(self.write_busy_timeout_ms),
    }
  }

  pub fn timezone(&self) -> anyhow::Result<Tz> {
    self
      .timezone
      .parse()
      .map_err(|e| anyhow!("unknown timezone {:?}: {e}", self.timezone))
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
