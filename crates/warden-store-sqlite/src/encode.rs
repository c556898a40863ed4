//! Decoding rows from both databases into domain types.
//!
//! Event rows carry binary ids and a JSON payload owned by the relay. The
//! payload is the only source of tags, content and signature; when it does
//! not parse, the row degrades instead of failing the read. Control-store
//! rows use plain integers for timestamps and compact JSON for lists.

use rusqlite::{Row, types::ValueRef};
use serde::Deserialize;
use uuid::Uuid;
use warden_core::{
  deletion::{DeletionRequest, DeletionStatus},
  event::{Event, encode_id},
  sync_job::{JobStatus, SyncJob, SyncProgress},
};

use crate::Result;

// ─── Events ──────────────────────────────────────────────────────────────────

/// Columns selected for every event read, in [`RawEvent::from_row`] order.
pub const EVENT_COLUMNS: &str = "event_hash, author, created_at, kind, content";

/// The subset of the stored canonical JSON that is not duplicated in
/// dedicated columns.
#[derive(Deserialize)]
struct Payload {
  #[serde(default)]
  tags:    Vec<Vec<String>>,
  #[serde(default)]
  content: String,
  #[serde(default)]
  sig:     String,
}

/// One `event` row, read as-is.
pub struct RawEvent {
  pub event_hash: Vec<u8>,
  pub author:     Vec<u8>,
  pub created_at: i64,
  pub kind:       u32,
  pub payload:    String,
}

impl RawEvent {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_hash: row.get(0)?,
      author:     row.get(1)?,
      created_at: row.get(2)?,
      kind:       row.get(3)?,
      payload:    text_lossy(row, 4)?,
    })
  }

  /// Unwrap the payload. A payload that fails to parse yields an event with
  /// empty tags and signature and the raw payload text as content.
  pub fn into_event(self) -> Event {
    let id = encode_id(&self.event_hash);
    let (tags, content, sig) = match serde_json::from_str::<Payload>(&self.payload) {
      Ok(p) => (p.tags, p.content, p.sig),
      Err(e) => {
        tracing::warn!(event_id = %id, error = %e, "undecodable event payload; returning raw content");
        (Vec::new(), self.payload, String::new())
      }
    };

    Event {
      id,
      pubkey: encode_id(&self.author),
      created_at: self.created_at,
      kind: self.kind,
      tags,
      content,
      sig,
    }
  }
}

/// Read a column as text whatever its storage class, so a payload written as
/// a BLOB (or NULL) by some relay version still comes back.
fn text_lossy(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
  Ok(match row.get_ref(idx)? {
    ValueRef::Text(b) | ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    ValueRef::Integer(i) => i.to_string(),
    ValueRef::Real(f) => f.to_string(),
    ValueRef::Null => String::new(),
  })
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_str(s)?)
}

fn to_u64(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Deletion requests ───────────────────────────────────────────────────────

pub const DELETION_COLUMNS: &str = "id, event_id, requested_by, target_ids, reason, status, \
                                    received_at, processed_at, deleted_count";

pub struct RawDeletionRequest {
  pub id:            i64,
  pub event_id:      String,
  pub requested_by:  String,
  pub target_ids:    String,
  pub reason:        Option<String>,
  pub status:        String,
  pub received_at:   i64,
  pub processed_at:  Option<i64>,
  pub deleted_count: i64,
}

impl RawDeletionRequest {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      event_id:      row.get(1)?,
      requested_by:  row.get(2)?,
      target_ids:    row.get(3)?,
      reason:        row.get(4)?,
      status:        row.get(5)?,
      received_at:   row.get(6)?,
      processed_at:  row.get(7)?,
      deleted_count: row.get(8)?,
    })
  }

  pub fn into_request(self) -> Result<DeletionRequest> {
    Ok(DeletionRequest {
      id:            self.id,
      event_id:      self.event_id,
      requested_by:  self.requested_by,
      target_ids:    decode_json(&self.target_ids)?,
      reason:        self.reason,
      status:        self.status.parse::<DeletionStatus>()?,
      received_at:   self.received_at,
      processed_at:  self.processed_at,
      deleted_count: to_u64(self.deleted_count),
    })
  }
}

// ─── Sync jobs ───────────────────────────────────────────────────────────────

pub const SYNC_JOB_COLUMNS: &str = "id, status, pubkeys, relays, kinds, since, events_fetched, \
                                    events_stored, events_skipped, error, started_at, finished_at";

pub struct RawSyncJob {
  pub id:             String,
  pub status:         String,
  pub pubkeys:        String,
  pub relays:         String,
  pub kinds:          Option<String>,
  pub since:          Option<i64>,
  pub events_fetched: i64,
  pub events_stored:  i64,
  pub events_skipped: i64,
  pub error:          Option<String>,
  pub started_at:     i64,
  pub finished_at:    Option<i64>,
}

impl RawSyncJob {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      status:         row.get(1)?,
      pubkeys:        row.get(2)?,
      relays:         row.get(3)?,
      kinds:          row.get(4)?,
      since:          row.get(5)?,
      events_fetched: row.get(6)?,
      events_stored:  row.get(7)?,
      events_skipped: row.get(8)?,
      error:          row.get(9)?,
      started_at:     row.get(10)?,
      finished_at:    row.get(11)?,
    })
  }

  pub fn into_job(self) -> Result<SyncJob> {
    Ok(SyncJob {
      id:          Uuid::parse_str(&self.id)?,
      status:      self.status.parse::<JobStatus>()?,
      pubkeys:     decode_json(&self.pubkeys)?,
      relays:      decode_json(&self.relays)?,
      kinds:       self.kinds.as_deref().map(decode_json).transpose()?,
      since:       self.since,
      progress:    SyncProgress {
        fetched: to_u64(self.events_fetched),
        stored:  to_u64(self.events_stored),
        skipped: to_u64(self.events_skipped),
      },
      error:       self.error,
      started_at:  self.started_at,
      finished_at: self.finished_at,
    })
  }
}
