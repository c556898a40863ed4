//! The key/value settings accessor and the keys this layer reads.

use std::future::Future;

pub const OPERATOR_PUBKEY: &str = "operator_pubkey";
pub const RETENTION_DAYS: &str = "retention_days";
/// JSON array of exception rule strings.
pub const RETENTION_EXCEPTIONS: &str = "retention_exceptions";
pub const HONOR_DELETION_REQUESTS: &str = "honor_deletion_requests";
pub const RETENTION_LAST_RUN: &str = "retention_last_run";

/// String settings keyed by name.
///
/// Implemented by the control store; the retention engine only needs this
/// much of it to resolve the operator pubkey and policy scalars.
pub trait Settings: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read a setting. Returns `None` if it was never set.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Create or overwrite a setting.
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
