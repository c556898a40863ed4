//! Filter translation: typed [`EventFilter`]s to parameterised reads of the
//! relay's `event` table.

use rusqlite::{OptionalExtension as _, params_from_iter, types::Value};
use tokio_util::sync::CancellationToken;
use warden_core::{
  event::{Event, decode_id},
  filter::EventFilter,
};

use crate::{
  Error, EventStore, Result,
  encode::{EVENT_COLUMNS, RawEvent},
  error::StorageContext as _,
  sql::{Predicates, interruptible},
};

impl EventStore {
  /// One page of events matching `filter`, newest first.
  ///
  /// Ties on `created_at` fall back to storage order. The page size is
  /// clamped by [`EventFilter::effective_limit`].
  pub async fn query(&self, filter: &EventFilter, cancel: &CancellationToken) -> Result<Vec<Event>> {
    let predicates = Predicates::from_filter(filter)?;
    let conn = self.reader()?;
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM event{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
      predicates.where_clause()
    );
    let mut params = predicates.params().to_vec();
    params.push(Value::Integer(filter.effective_limit()));
    params.push(Value::Integer(filter.effective_offset()));
    tracing::debug!(%sql, params = params.len(), "querying events");

    let cancel = cancel.clone();
    let raws: Option<Vec<RawEvent>> = conn
      .call(move |conn| {
        Ok(interruptible(conn, &cancel, |conn| {
          let mut stmt = conn.prepare(&sql)?;
          let mut rows = stmt.query(params_from_iter(params.iter()))?;
          let mut out = Vec::new();
          while let Some(row) = rows.next()? {
            if cancel.is_cancelled() {
              return Ok(None);
            }
            out.push(RawEvent::from_row(row)?);
          }
          Ok(Some(out))
        })?)
      })
      .await
      .during("query events")?;

    let raws = raws.ok_or(Error::Cancelled)?;
    Ok(raws.into_iter().map(RawEvent::into_event).collect())
  }

  /// Number of events matching `filter`; limit and offset are ignored.
  ///
  /// A cancel observed while the engine is still scanning aborts the
  /// statement.
  pub async fn count(&self, filter: &EventFilter, cancel: &CancellationToken) -> Result<u64> {
    let predicates = Predicates::from_filter(filter)?;
    let conn = self.reader()?;
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    let sql = format!("SELECT COUNT(*) FROM event{}", predicates.where_clause());
    let cancel = cancel.clone();
    let count: i64 = conn
      .call(move |conn| {
        Ok(interruptible(conn, &cancel, |conn| {
          conn.query_row(&sql, params_from_iter(predicates.params().iter()), |row| row.get(0))
        })?)
      })
      .await
      .during("count events")?;

    Ok(u64::try_from(count).unwrap_or(0))
  }

  /// A single event by hex id.
  pub async fn get_event(&self, id: &str) -> Result<Option<Event>> {
    let id = decode_id("id", id)?.to_vec();
    let conn = self.reader()?;

    let raw: Option<RawEvent> = conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {EVENT_COLUMNS} FROM event WHERE event_hash = ?1"),
              rusqlite::params![id],
              RawEvent::from_row,
            )
            .optional()?,
        )
      })
      .await
      .during("read event")?;

    Ok(raw.map(RawEvent::into_event))
  }
}
