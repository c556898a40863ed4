//! The retention and deletion engine, run over a [`MaintenanceHandle`].
//!
//! Deleting rows never shrinks the file; call [`MaintenanceHandle::vacuum`]
//! afterwards when the space matters.

use rusqlite::{params_from_iter, types::Value};
use tokio_util::sync::CancellationToken;
use warden_core::{event::decode_id, retention::ExclusionSet};

use crate::{Error, MaintenanceHandle, Result, error::StorageContext as _, sql::Predicates};

/// Ids bound per `DELETE ... IN (...)` statement.
const DELETE_CHUNK: usize = 500;

impl MaintenanceHandle {
  /// Delete every event created before `cutoff` that no exception rule
  /// protects, returning the number of rows removed.
  ///
  /// `exceptions` are rule strings (`kind:<N>`, `pubkey:<hex>`,
  /// `pubkey:operator`). Malformed rules are skipped with a warning, and
  /// `pubkey:operator` protects nothing when `operator` is `None`.
  pub async fn delete_before<S: AsRef<str>>(
    &self,
    cutoff: i64,
    exceptions: &[S],
    operator: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<u64> {
    let exclusions = ExclusionSet::resolve(exceptions, operator);
    for rule in &exclusions.skipped {
      tracing::warn!(rule = %rule, "ignoring exception rule");
    }

    let mut predicates = Predicates::default();
    predicates
      .push("created_at < ?", cutoff)
      .push_not_in(
        "kind",
        exclusions.kinds.iter().map(|k| Value::Integer(i64::from(*k))).collect(),
      )
      .push_not_in(
        "author",
        exclusions.authors.iter().map(|a| Value::Blob(a.to_vec())).collect(),
      );
    let sql = format!("DELETE FROM event{}", predicates.where_clause());
    tracing::debug!(%sql, cutoff, "retention delete");

    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }
    let deleted = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, params_from_iter(predicates.params().iter()))?))
      .await
      .during("delete events before cutoff")?;

    tracing::info!(
      cutoff,
      deleted,
      kept_kinds = exclusions.kinds.len(),
      kept_authors = exclusions.authors.len(),
      "retention delete finished"
    );
    Ok(deleted as u64)
  }

  /// Delete events by hex id. An empty list is a no-op returning zero.
  pub async fn delete_by_ids<S: AsRef<str>>(
    &self,
    ids: &[S],
    cancel: &CancellationToken,
  ) -> Result<u64> {
    self.delete_ids(ids, None, cancel).await
  }

  /// Delete events by hex id, but only those authored by `author`.
  ///
  /// Used for protocol deletion requests, which may only remove the
  /// requester's own events.
  pub async fn delete_by_ids_from_author<S: AsRef<str>>(
    &self,
    ids: &[S],
    author: &str,
    cancel: &CancellationToken,
  ) -> Result<u64> {
    self.delete_ids(ids, Some(author), cancel).await
  }

  async fn delete_ids<S: AsRef<str>>(
    &self,
    ids: &[S],
    author: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<u64> {
    if ids.is_empty() {
      return Ok(0);
    }
    let ids: Vec<Value> = ids
      .iter()
      .map(|id| decode_id("id", id.as_ref()).map(|b| Value::Blob(b.to_vec())))
      .collect::<warden_core::Result<_>>()?;
    let author = author
      .map(|a| decode_id("author", a).map(|b| Value::Blob(b.to_vec())))
      .transpose()?;
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    let statements: Vec<Predicates> = ids
      .chunks(DELETE_CHUNK)
      .map(|chunk| {
        let mut p = Predicates::default();
        p.push_in("event_hash", chunk.to_vec());
        if let Some(author) = &author {
          p.push("author = ?", author.clone());
        }
        p
      })
      .collect();

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut deleted = 0usize;
        for p in &statements {
          let sql = format!("DELETE FROM event{}", p.where_clause());
          deleted += tx.execute(&sql, params_from_iter(p.params().iter()))?;
        }
        tx.commit()?;
        Ok(deleted)
      })
      .await
      .during("delete events by id")?;

    tracing::info!(deleted, "deleted events by id");
    Ok(deleted as u64)
  }

  /// Rebuild the database file to reclaim space freed by deletions.
  pub async fn vacuum(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch("VACUUM;")?;
        Ok(())
      })
      .await
      .during("vacuum event store")?;
    tracing::info!("event store vacuumed");
    Ok(())
  }

  /// `PRAGMA integrity_check` output; `["ok"]` when the file is healthy.
  pub async fn integrity_check(&self) -> Result<Vec<String>> {
    let report: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("PRAGMA integrity_check")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .during("integrity check")?;

    if report.as_slice() != ["ok"] {
      tracing::warn!(problems = report.len(), "event store integrity check reported problems");
    }
    Ok(report)
  }
}
