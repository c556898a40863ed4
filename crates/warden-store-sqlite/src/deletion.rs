//! The deletion request queue on [`ControlStore`].

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use warden_core::{
  deletion::{DeletionRequest, DeletionStatus, NewDeletionRequest},
  event::decode_id,
};

use crate::{
  ControlStore, Error, Result,
  encode::{DELETION_COLUMNS, RawDeletionRequest, encode_json},
  error::StorageContext as _,
};

impl ControlStore {
  /// Queue a deletion request and return its id.
  ///
  /// Every target must be a well-formed hex id. Enqueueing a token that is
  /// already queued returns the existing request's id unchanged.
  pub async fn enqueue(&self, request: &NewDeletionRequest) -> Result<i64> {
    Ok(self.insert_request(request).await?.0)
  }

  /// Like [`enqueue`](Self::enqueue), also reporting whether the token was
  /// new.
  pub(crate) async fn insert_request(&self, request: &NewDeletionRequest) -> Result<(i64, bool)> {
    for target in &request.target_ids {
      decode_id("target", target)?;
    }
    let targets: Vec<String> = request.target_ids.iter().map(|t| t.to_ascii_lowercase()).collect();
    let target_json = encode_json(&targets)?;
    let event_id = request.event_id.clone();
    let requested_by = request.requested_by.clone();
    let reason = request.reason.clone();
    let now = Utc::now().timestamp();

    let (id, inserted): (i64, bool) = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO deletion_requests (event_id, requested_by, target_ids, reason, received_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(event_id) DO NOTHING",
          rusqlite::params![event_id, requested_by, target_json, reason, now],
        )? > 0;
        let id = conn.query_row(
          "SELECT id FROM deletion_requests WHERE event_id = ?1",
          rusqlite::params![event_id],
          |row| row.get(0),
        )?;
        Ok((id, inserted))
      })
      .await
      .during("enqueue deletion request")?;

    if inserted {
      tracing::info!(request_id = id, token = %request.event_id, targets = request.target_ids.len(), "deletion request queued");
    } else {
      tracing::debug!(request_id = id, token = %request.event_id, "deletion request already queued");
    }
    Ok((id, inserted))
  }

  pub async fn get_deletion_request(&self, id: i64) -> Result<Option<DeletionRequest>> {
    let raw: Option<RawDeletionRequest> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {DELETION_COLUMNS} FROM deletion_requests WHERE id = ?1"),
              rusqlite::params![id],
              RawDeletionRequest::from_row,
            )
            .optional()?,
        )
      })
      .await
      .during("read deletion request")?;

    raw.map(RawDeletionRequest::into_request).transpose()
  }

  pub async fn list_pending(&self) -> Result<Vec<DeletionRequest>> {
    self.list_by_status(DeletionStatus::Pending).await
  }

  /// Requests with `status`, oldest first.
  pub async fn list_by_status(&self, status: DeletionStatus) -> Result<Vec<DeletionRequest>> {
    let status = status.as_str();
    let raws: Vec<RawDeletionRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DELETION_COLUMNS} FROM deletion_requests
           WHERE status = ?1
           ORDER BY received_at ASC, id ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status], RawDeletionRequest::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .during("list deletion requests")?;

    raws.into_iter().map(RawDeletionRequest::into_request).collect()
  }

  /// The most recent `limit` requests of any status, newest first.
  pub async fn recent_deletion_requests(&self, limit: usize) -> Result<Vec<DeletionRequest>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let raws: Vec<RawDeletionRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DELETION_COLUMNS} FROM deletion_requests
           ORDER BY received_at DESC, id DESC
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawDeletionRequest::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .during("list deletion requests")?;

    raws.into_iter().map(RawDeletionRequest::into_request).collect()
  }

  /// Move a pending request to a terminal status, once.
  pub async fn mark_processed(
    &self,
    id: i64,
    status: DeletionStatus,
    deleted_count: u64,
  ) -> Result<()> {
    if !status.is_terminal() {
      return Err(Error::NotTerminal(status.as_str()));
    }
    let status_str = status.as_str();
    let count = i64::try_from(deleted_count).unwrap_or(i64::MAX);
    let now = Utc::now().timestamp();

    let (updated, exists) = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE deletion_requests
           SET status = ?1, processed_at = ?2, deleted_count = ?3
           WHERE id = ?4 AND status = 'pending'",
          rusqlite::params![status_str, now, count, id],
        )?;
        if updated > 0 {
          return Ok((true, true));
        }
        let exists = conn
          .query_row(
            "SELECT 1 FROM deletion_requests WHERE id = ?1",
            rusqlite::params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok((false, exists))
      })
      .await
      .during("mark deletion request processed")?;

    match (updated, exists) {
      (true, _) => Ok(()),
      (false, true) => Err(Error::RequestAlreadyProcessed(id)),
      (false, false) => Err(Error::RequestNotFound(id)),
    }
  }
}
