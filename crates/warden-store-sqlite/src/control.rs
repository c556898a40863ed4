//! [`ControlStore`]: warden's own database: settings, the deletion request
//! queue and sync jobs.

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use warden_core::{
  retention::RetentionPolicy,
  settings::{self, Settings},
};

use crate::{
  Error, Result,
  encode::{decode_json, encode_json},
  error::StorageContext as _,
  schema::SCHEMA,
};

/// The control store, backed by a single SQLite connection.
///
/// One connection means one writer: concurrent mutations queue on the
/// connection thread instead of racing. Cloning is cheap; the inner
/// connection is reference-counted.
#[derive(Clone)]
pub struct ControlStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl ControlStore {
  /// Open (or create) the store at `path`, creating parent directories.
  pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }
    let conn = tokio_rusqlite::Connection::open(path)
      .await
      .during("open control store")?;
    let store = Self { conn };
    store.init(busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .during("open control store")?;
    let store = Self { conn };
    store.init(Duration::from_secs(5)).await?;
    Ok(store)
  }

  async fn init(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
      .during("initialise control schema")
  }

  // ── Settings-backed accessors ─────────────────────────────────────────────

  /// The configured operator pubkey, if any.
  pub async fn operator_pubkey(&self) -> Result<Option<String>> {
    Ok(
      self
        .get(settings::OPERATOR_PUBKEY)
        .await?
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty()),
    )
  }

  /// Load the retention policy from its individual settings.
  ///
  /// Unparsable scalars fall back to the inert default (retention disabled,
  /// deletion requests not honoured). Unparsable exceptions are an error:
  /// guessing there could delete events the operator meant to keep.
  pub async fn retention_policy(&self) -> Result<RetentionPolicy> {
    let days = self.get(settings::RETENTION_DAYS).await?;
    let exceptions = self.get(settings::RETENTION_EXCEPTIONS).await?;
    let honor = self.get(settings::HONOR_DELETION_REQUESTS).await?;
    let last_run = self.get(settings::RETENTION_LAST_RUN).await?;

    let retention_days = match days.as_deref().map(str::trim) {
      None | Some("") => 0,
      Some(v) => v.parse().unwrap_or_else(|_| {
        tracing::warn!(value = v, "invalid retention_days setting; retention disabled");
        0
      }),
    };
    let exceptions = match exceptions.as_deref().map(str::trim) {
      None | Some("") => Vec::new(),
      Some(v) => decode_json(v)?,
    };

    Ok(RetentionPolicy {
      retention_days,
      exceptions,
      honor_deletion_requests: honor.as_deref().map(str::trim) == Some("true"),
      last_run: last_run.and_then(|v| v.trim().parse().ok()),
    })
  }

  /// Persist every field of `policy` except `last_run`.
  pub async fn save_retention_policy(&self, policy: &RetentionPolicy) -> Result<()> {
    let exceptions = encode_json(&policy.exceptions)?;
    self
      .set(settings::RETENTION_DAYS, &policy.retention_days.to_string())
      .await?;
    self.set(settings::RETENTION_EXCEPTIONS, &exceptions).await?;
    self
      .set(
        settings::HONOR_DELETION_REQUESTS,
        if policy.honor_deletion_requests { "true" } else { "false" },
      )
      .await
  }

  pub async fn record_retention_run(&self, at: i64) -> Result<()> {
    self.set(settings::RETENTION_LAST_RUN, &at.to_string()).await
  }
}

// ─── Settings impl ───────────────────────────────────────────────────────────

impl Settings for ControlStore {
  type Error = Error;

  async fn get<'a>(&'a self, key: &'a str) -> Result<Option<String>> {
    let key = key.to_owned();
    self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM settings WHERE key = ?1",
              rusqlite::params![key],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await
      .during("read setting")
  }

  async fn set<'a>(&'a self, key: &'a str, value: &'a str) -> Result<()> {
    let key = key.to_owned();
    let value = value.to_owned();
    let now = Utc::now().timestamp();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
          rusqlite::params![key, value, now],
        )?;
        Ok(())
      })
      .await
      .during("write setting")
  }
}
