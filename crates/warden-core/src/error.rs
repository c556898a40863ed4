//! Error types for `warden-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A hex identifier (event id or pubkey) did not decode to 32 bytes.
  #[error("invalid {field}: {value:?} is not a 64-character hex string")]
  InvalidIdentifier { field: &'static str, value: String },

  #[error("invalid exception rule: {0:?}")]
  InvalidExceptionRule(String),

  #[error("unknown deletion status: {0:?}")]
  UnknownDeletionStatus(String),

  #[error("unknown job status: {0:?}")]
  UnknownJobStatus(String),

  #[error("timestamp out of range: {0}")]
  TimestampOutOfRange(i64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
