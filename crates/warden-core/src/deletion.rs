//! Deletion requests: queued intent to remove events, tracked separately
//! from the removal itself so the queue doubles as an audit trail.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{Event, KIND_DELETION, is_valid_id},
};

/// Prefix of request tokens synthesised for admin-initiated deletions.
///
/// Protocol requests use the requesting event's hex id as their token, which
/// can never contain this prefix.
pub const ADMIN_TOKEN_PREFIX: &str = "admin-";

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStatus {
  Pending,
  Processed,
  Failed,
}

impl DeletionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Processed => "processed",
      Self::Failed => "failed",
    }
  }

  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }
}

impl fmt::Display for DeletionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DeletionStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "processed" => Ok(Self::Processed),
      "failed" => Ok(Self::Failed),
      other => Err(Error::UnknownDeletionStatus(other.to_owned())),
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A persisted deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
  pub id:            i64,
  /// The triggering event's id, or an `admin-` token.
  pub event_id:      String,
  pub requested_by:  String,
  pub target_ids:    Vec<String>,
  pub reason:        Option<String>,
  pub status:        DeletionStatus,
  pub received_at:   i64,
  pub processed_at:  Option<i64>,
  pub deleted_count: u64,
}

impl DeletionRequest {
  pub fn is_admin(&self) -> bool { self.event_id.starts_with(ADMIN_TOKEN_PREFIX) }
}

/// Input to the deletion queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeletionRequest {
  pub event_id:     String,
  pub requested_by: String,
  pub target_ids:   Vec<String>,
  pub reason:       Option<String>,
}

impl NewDeletionRequest {
  /// An operator-initiated request to delete a single event.
  pub fn admin(
    target_id: impl Into<String>,
    requested_by: impl Into<String>,
    reason: Option<String>,
  ) -> Self {
    Self {
      event_id: format!("{ADMIN_TOKEN_PREFIX}{}", Uuid::new_v4().simple()),
      requested_by: requested_by.into(),
      target_ids: vec![target_id.into()],
      reason,
    }
  }

  /// A request carried by a kind-5 event: every `e` tag names a target and
  /// the content is the optional reason.
  ///
  /// Returns `None` when the event is not a deletion request or names no
  /// well-formed target.
  pub fn from_event(event: &Event) -> Option<Self> {
    if event.kind != KIND_DELETION {
      return None;
    }
    let mut target_ids: Vec<String> = Vec::new();
    for value in event.tag_values("e").filter(|v| is_valid_id(v)) {
      let value = value.to_ascii_lowercase();
      if !target_ids.contains(&value) {
        target_ids.push(value);
      }
    }
    if target_ids.is_empty() {
      return None;
    }
    let reason = Some(event.content.trim().to_owned()).filter(|r| !r.is_empty());

    Some(Self {
      event_id: event.id.clone(),
      requested_by: event.pubkey.clone(),
      target_ids,
      reason,
    })
  }
}
