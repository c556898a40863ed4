//! Sync job bookkeeping on [`ControlStore`].

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;
use warden_core::sync_job::{JobStatus, NewSyncJob, SyncJob, SyncProgress};

use crate::{
  ControlStore, Error, Result,
  encode::{RawSyncJob, SYNC_JOB_COLUMNS, encode_json},
  error::StorageContext as _,
};

fn to_i64(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

impl ControlStore {
  /// Record a new job in the `running` state.
  ///
  /// Does not check for another running job; see [`Self::running_sync_job`].
  pub async fn start_sync_job(&self, input: NewSyncJob) -> Result<SyncJob> {
    let job = SyncJob {
      id:          Uuid::new_v4(),
      status:      JobStatus::Running,
      pubkeys:     input.pubkeys,
      relays:      input.relays,
      kinds:       input.kinds,
      since:       input.since,
      progress:    SyncProgress::default(),
      error:       None,
      started_at:  Utc::now().timestamp(),
      finished_at: None,
    };

    let id_str      = job.id.to_string();
    let pubkeys_str = encode_json(&job.pubkeys)?;
    let relays_str  = encode_json(&job.relays)?;
    let kinds_str   = job.kinds.as_ref().map(encode_json).transpose()?;
    let since       = job.since;
    let started_at  = job.started_at;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_jobs (id, status, pubkeys, relays, kinds, since, started_at)
           VALUES (?1, 'running', ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, pubkeys_str, relays_str, kinds_str, since, started_at],
        )?;
        Ok(())
      })
      .await
      .during("start sync job")?;

    tracing::info!(job_id = %job.id, authors = job.pubkeys.len(), relays = job.relays.len(), "sync job started");
    Ok(job)
  }

  /// Overwrite the counters of a running job.
  pub async fn record_sync_progress(&self, id: Uuid, progress: SyncProgress) -> Result<()> {
    let id_str = id.to_string();
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sync_jobs
           SET events_fetched = ?1, events_stored = ?2, events_skipped = ?3
           WHERE id = ?4 AND status = 'running'",
          rusqlite::params![
            to_i64(progress.fetched),
            to_i64(progress.stored),
            to_i64(progress.skipped),
            id_str,
          ],
        )?)
      })
      .await
      .during("record sync progress")?;

    if updated == 0 {
      return Err(self.not_running(id).await?);
    }
    Ok(())
  }

  /// Move a running job to a terminal status.
  pub async fn finish_sync_job(
    &self,
    id: Uuid,
    status: JobStatus,
    error: Option<String>,
  ) -> Result<SyncJob> {
    if !status.is_terminal() {
      return Err(Error::NotTerminal(status.as_str()));
    }
    let id_str = id.to_string();
    let status_str = status.as_str();
    let now = Utc::now().timestamp();

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sync_jobs SET status = ?1, error = ?2, finished_at = ?3
           WHERE id = ?4 AND status = 'running'",
          rusqlite::params![status_str, error, now, id_str],
        )?)
      })
      .await
      .during("finish sync job")?;

    if updated == 0 {
      return Err(self.not_running(id).await?);
    }
    tracing::info!(job_id = %id, status = status_str, "sync job finished");
    self.get_sync_job(id).await?.ok_or(Error::JobNotFound(id))
  }

  pub async fn get_sync_job(&self, id: Uuid) -> Result<Option<SyncJob>> {
    let id_str = id.to_string();
    let raw: Option<RawSyncJob> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SYNC_JOB_COLUMNS} FROM sync_jobs WHERE id = ?1"),
              rusqlite::params![id_str],
              RawSyncJob::from_row,
            )
            .optional()?,
        )
      })
      .await
      .during("read sync job")?;

    raw.map(RawSyncJob::into_job).transpose()
  }

  /// The most recently started job still `running`, if any.
  pub async fn running_sync_job(&self) -> Result<Option<SyncJob>> {
    let raw: Option<RawSyncJob> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SYNC_JOB_COLUMNS} FROM sync_jobs
                 WHERE status = 'running'
                 ORDER BY started_at DESC, rowid DESC
                 LIMIT 1"
              ),
              [],
              RawSyncJob::from_row,
            )
            .optional()?,
        )
      })
      .await
      .during("read running sync job")?;

    raw.map(RawSyncJob::into_job).transpose()
  }

  /// The `limit` most recently started jobs, newest first.
  pub async fn list_sync_jobs(&self, limit: usize) -> Result<Vec<SyncJob>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let raws: Vec<RawSyncJob> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SYNC_JOB_COLUMNS} FROM sync_jobs
           ORDER BY started_at DESC, rowid DESC
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawSyncJob::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .during("list sync jobs")?;

    raws.into_iter().map(RawSyncJob::into_job).collect()
  }

  async fn not_running(&self, id: Uuid) -> Result<Error> {
    Ok(match self.get_sync_job(id).await? {
      Some(_) => Error::JobNotRunning(id),
      None => Error::JobNotFound(id),
    })
  }
}
