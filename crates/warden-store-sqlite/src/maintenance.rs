//! Jobs that span both stores: applying the retention policy, taking
//! deletion events into the request queue and draining that queue.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use warden_core::{
  deletion::{DeletionRequest, DeletionStatus, NewDeletionRequest},
  event::KIND_DELETION,
  filter::EventFilter,
};

use crate::{Error, MaintenanceHandle, Result, Stores};

/// Result of one retention pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionOutcome {
  pub cutoff:  i64,
  pub deleted: u64,
}

/// Result of one pass over the pending deletion requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
  pub processed: usize,
  pub failed:    usize,
  /// Protocol requests left pending because honouring them is disabled.
  pub deferred:  usize,
  pub deleted:   u64,
}

/// Result of one scan of the event store for deletion events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectSummary {
  /// Deletion events read from the event store.
  pub scanned:        usize,
  /// Requests added to the queue by this scan.
  pub queued:         usize,
  /// Requests whose token was already in the queue.
  pub already_queued: usize,
  /// Deletion events naming no well-formed target.
  pub ignored:        usize,
}

impl Stores {
  /// Apply the stored retention policy as of `now`.
  ///
  /// Returns `None` without touching the event store when retention is
  /// disabled. On success the run time is recorded in the control store.
  pub async fn apply_retention(
    &self,
    now: i64,
    cancel: &CancellationToken,
  ) -> Result<Option<RetentionOutcome>> {
    let policy = self.control().retention_policy().await?;
    let Some(cutoff) = policy.cutoff(now) else {
      tracing::debug!("retention disabled; nothing to do");
      return Ok(None);
    };
    let operator = self.control().operator_pubkey().await?;

    let handle = self.events().open_for_write().await?;
    let result = handle
      .delete_before(cutoff, &policy.exceptions, operator.as_deref(), cancel)
      .await;
    handle.close().await?;
    let deleted = result?;

    self.control().record_retention_run(now).await?;
    tracing::info!(cutoff, deleted, days = policy.retention_days, "retention applied");
    Ok(Some(RetentionOutcome { cutoff, deleted }))
  }

  /// Queue a protocol request for every kind-5 event in the event store
  /// created at or after `since`.
  ///
  /// The event id is the request token, so scanning the same events again
  /// queues nothing new. Whether a request is carried out is decided later
  /// by [`process_deletion_requests`](Self::process_deletion_requests).
  pub async fn collect_deletion_requests(
    &self,
    since: Option<i64>,
    cancel: &CancellationToken,
  ) -> Result<CollectSummary> {
    let filter = EventFilter { since, ..Default::default() }.with_kinds([KIND_DELETION]);
    let mut summary = CollectSummary::default();
    let mut requests = Vec::new();

    self
      .events()
      .stream(&filter, cancel, |event| {
        summary.scanned += 1;
        match NewDeletionRequest::from_event(&event) {
          Some(request) => requests.push(request),
          None => {
            tracing::debug!(event = %event.id, "deletion event names no target; ignored");
            summary.ignored += 1;
          }
        }
        Ok::<_, std::convert::Infallible>(())
      })
      .await?;

    let control = self.control();
    for request in &requests {
      if cancel.is_cancelled() {
        return Err(Error::Cancelled);
      }
      match control.insert_request(request).await? {
        (_, true) => summary.queued += 1,
        (_, false) => summary.already_queued += 1,
      }
    }

    tracing::info!(
      scanned = summary.scanned,
      queued = summary.queued,
      already_queued = summary.already_queued,
      ignored = summary.ignored,
      "deletion events collected"
    );
    Ok(summary)
  }

  /// Work through every pending deletion request, oldest first.
  ///
  /// Admin requests are always carried out. Protocol requests are carried
  /// out only when the policy honours them, and then only against events
  /// authored by the requester; otherwise they stay pending. A request
  /// that fails is marked failed and processing moves on to the next.
  pub async fn process_deletion_requests(
    &self,
    cancel: &CancellationToken,
  ) -> Result<ProcessSummary> {
    let pending = self.control().list_pending().await?;
    let mut summary = ProcessSummary::default();
    if pending.is_empty() {
      return Ok(summary);
    }
    let honor = self.control().retention_policy().await?.honor_deletion_requests;

    let handle = self.events().open_for_write().await?;
    let result = self
      .drain_requests(&handle, pending, honor, cancel, &mut summary)
      .await;
    handle.close().await?;
    result?;

    tracing::info!(
      processed = summary.processed,
      failed = summary.failed,
      deferred = summary.deferred,
      deleted = summary.deleted,
      "deletion requests processed"
    );
    Ok(summary)
  }

  async fn drain_requests(
    &self,
    handle: &MaintenanceHandle,
    pending: Vec<DeletionRequest>,
    honor: bool,
    cancel: &CancellationToken,
    summary: &mut ProcessSummary,
  ) -> Result<()> {
    for request in pending {
      if cancel.is_cancelled() {
        return Err(Error::Cancelled);
      }

      let outcome = if request.is_admin() {
        handle.delete_by_ids(&request.target_ids, cancel).await
      } else if honor {
        handle
          .delete_by_ids_from_author(&request.target_ids, &request.requested_by, cancel)
          .await
      } else {
        summary.deferred += 1;
        continue;
      };

      match outcome {
        Ok(deleted) => {
          self
            .control()
            .mark_processed(request.id, DeletionStatus::Processed, deleted)
            .await?;
          summary.processed += 1;
          summary.deleted += deleted;
        }
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => {
          tracing::warn!(request_id = request.id, error = %e, "deletion request failed");
          self
            .control()
            .mark_processed(request.id, DeletionStatus::Failed, 0)
            .await?;
          summary.failed += 1;
        }
      }
    }
    Ok(())
  }
}
