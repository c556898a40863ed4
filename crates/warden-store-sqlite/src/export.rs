//! Streaming export of every event matching a filter.
//!
//! Rows are decoded on the connection thread and handed to the caller's
//! callback over a bounded channel, so memory stays flat however large the
//! result set is.

use rusqlite::params_from_iter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use warden_core::{event::Event, filter::EventFilter};

use crate::{
  Error, EventStore, Result,
  encode::{EVENT_COLUMNS, RawEvent},
  error::StorageContext as _,
  sql::{Predicates, interruptible},
};

/// Decoded events buffered between the scan and the callback.
const EXPORT_BUFFER: usize = 256;

/// How the scan on the connection thread ended.
enum ScanEnd {
  Exhausted,
  Cancelled,
  ReceiverGone,
}

impl EventStore {
  /// Invoke `on_event` once per event matching `filter`, oldest first.
  ///
  /// Limit and offset are ignored. Cancellation is checked before every
  /// row; once it is observed no further events are delivered and
  /// [`Error::Cancelled`] is returned. A callback error stops the scan and
  /// is returned as [`Error::Callback`]. Returns the number of events
  /// delivered.
  pub async fn stream<F, E>(
    &self,
    filter: &EventFilter,
    cancel: &CancellationToken,
    mut on_event: F,
  ) -> Result<u64>
  where
    F: FnMut(Event) -> std::result::Result<(), E>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
  {
    let predicates = Predicates::from_filter(filter)?;
    let conn = self.reader()?;
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM event{} ORDER BY created_at ASC, id ASC",
      predicates.where_clause()
    );
    let (tx, mut rx) = mpsc::channel::<Event>(EXPORT_BUFFER);

    let scan_cancel = cancel.clone();
    let scan = conn.call(move |conn| {
      Ok(interruptible(conn, &scan_cancel, |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(predicates.params().iter()))?;
        while let Some(row) = rows.next()? {
          if scan_cancel.is_cancelled() {
            return Ok(ScanEnd::Cancelled);
          }
          let event = RawEvent::from_row(row)?.into_event();
          if tx.blocking_send(event).is_err() {
            return Ok(ScanEnd::ReceiverGone);
          }
        }
        Ok(ScanEnd::Exhausted)
      })?)
    });

    // Dropping `rx` on an early return unblocks the scan.
    let deliver = async move {
      let mut delivered = 0u64;
      while let Some(event) = rx.recv().await {
        if cancel.is_cancelled() {
          return Err(Error::Cancelled);
        }
        on_event(event).map_err(|e| Error::Callback(e.into()))?;
        delivered += 1;
      }
      Ok::<_, Error>(delivered)
    };

    let (scan, delivered) = tokio::join!(scan, deliver);
    let delivered = delivered?;

    match scan.during("export events")? {
      ScanEnd::Cancelled => Err(Error::Cancelled),
      ScanEnd::Exhausted | ScanEnd::ReceiverGone => {
        tracing::debug!(delivered, "export finished");
        Ok(delivered)
      }
    }
  }
}
