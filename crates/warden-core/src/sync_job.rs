//! Sync jobs: bookkeeping for pulls of an author set from remote relays.
//!
//! A job starts `running` and ends in exactly one terminal status. Only one
//! job is expected to run at a time; that is the caller's discipline, the
//! store does not enforce it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl JobStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Cancelled => "cancelled",
    }
  }

  pub fn is_terminal(self) -> bool { !matches!(self, Self::Running) }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for JobStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "running" => Ok(Self::Running),
      "completed" => Ok(Self::Completed),
      "failed" => Ok(Self::Failed),
      "cancelled" => Ok(Self::Cancelled),
      other => Err(Error::UnknownJobStatus(other.to_owned())),
    }
  }
}

/// Running counters of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
  pub fetched: u64,
  pub stored:  u64,
  pub skipped: u64,
}

/// Parameters for a new job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSyncJob {
  pub pubkeys: Vec<String>,
  pub relays:  Vec<String>,
  pub kinds:   Option<Vec<u32>>,
  pub since:   Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
  pub id:          Uuid,
  pub status:      JobStatus,
  pub pubkeys:     Vec<String>,
  pub relays:      Vec<String>,
  pub kinds:       Option<Vec<u32>>,
  pub since:       Option<i64>,
  pub progress:    SyncProgress,
  pub error:       Option<String>,
  pub started_at:  i64,
  pub finished_at: Option<i64>,
}
