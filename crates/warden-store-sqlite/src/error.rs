//! Error type for `warden-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed caller input, e.g. an identifier that is not 64 hex chars.
  #[error("{0}")]
  Core(#[from] warden_core::Error),

  /// The relay's database did not exist when the event store was opened.
  #[error("event store is not connected")]
  NotConnected,

  #[error("{op} failed: {source}")]
  Storage {
    op:     &'static str,
    #[source]
    source: tokio_rusqlite::Error,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("operation cancelled")]
  Cancelled,

  /// The per-event export callback reported a failure.
  #[error("export callback failed: {0}")]
  Callback(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("deletion request not found: {0}")]
  RequestNotFound(i64),

  #[error("deletion request {0} is already processed")]
  RequestAlreadyProcessed(i64),

  #[error("{0} is not a terminal status")]
  NotTerminal(&'static str),

  #[error("sync job not found: {0}")]
  JobNotFound(Uuid),

  #[error("sync job {0} is not running")]
  JobNotRunning(Uuid),
}

impl Error {
  /// Whether the engine gave up waiting on a lock held by another writer.
  pub fn is_busy(&self) -> bool {
    matches!(
      self,
      Self::Storage {
        source: tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)),
        ..
      } if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attach the name of the failing operation to an engine error.
pub(crate) trait StorageContext<T> {
  fn during(self, op: &'static str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, tokio_rusqlite::Error> {
  fn during(self, op: &'static str) -> Result<T> {
    self.map_err(|source| match source {
      // Raised by the progress handler installed in `sql::interruptible`.
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
        if e.code == rusqlite::ErrorCode::OperationInterrupted =>
      {
        Error::Cancelled
      }
      source => Error::Storage { op, source },
    })
  }
}
