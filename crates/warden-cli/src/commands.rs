//! One handler per subcommand. Each prints its result as JSON on stdout.

use std::io::{BufWriter, Write as _};

use anyhow::{Context as _, bail};
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use warden_core::{
  deletion::{DeletionStatus, NewDeletionRequest},
  filter::EventFilter,
  retention::ExceptionRule,
  stats::{Granularity, local_day_start},
};
use warden_store_sqlite::{CancellationToken, Stores};

const SECONDS_PER_DAY: i64 = 86_400;

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  let stdout = std::io::stdout();
  let mut out = stdout.lock();
  serde_json::to_writer_pretty(&mut out, value).context("failed to write output")?;
  writeln!(out)?;
  Ok(())
}

/// A token cancelled by the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupted; stopping");
      on_signal.cancel();
    }
  });
  cancel
}

// ─── Reads ────────────────────────────────────────────────────────────────────

pub async fn stats(
  stores: &Stores,
  tz: &Tz,
  days: u32,
  top: usize,
  hourly: bool,
) -> anyhow::Result<()> {
  let cancel = cancel_on_ctrl_c();
  let events = stores.events();
  let now = Utc::now().timestamp();
  let today = local_day_start(tz, now)?;

  let (since, granularity) = if hourly {
    (today, Granularity::Hour)
  } else {
    let back = i64::from(days.max(1) - 1) * SECONDS_PER_DAY;
    (local_day_start(tz, today - back)?, Granularity::Day)
  };

  let overview = events.overview(now, tz, &cancel).await.context("overview")?;
  let histogram = events
    .events_over_time(since, now, granularity, tz, &cancel)
    .await
    .context("events over time")?;
  let kinds = events
    .events_by_kind(Some(since), None, &cancel)
    .await
    .context("events by kind")?;
  let authors = events
    .top_authors(top, Some(since), None, &cancel)
    .await
    .context("top authors")?;

  print_json(&json!({
    "timezone": tz.name(),
    "since": since,
    "overview": overview,
    "histogram": histogram,
    "kinds": kinds,
    "top_authors": authors,
  }))
}

pub async fn query(stores: &Stores, filter: EventFilter, count: bool) -> anyhow::Result<()> {
  let cancel = cancel_on_ctrl_c();
  if count {
    let n = stores.events().count(&filter, &cancel).await.context("count failed")?;
    return print_json(&n);
  }
  let events = stores.events().query(&filter, &cancel).await.context("query failed")?;
  print_json(&events)
}

pub async fn export(stores: &Stores, filter: EventFilter) -> anyhow::Result<()> {
  let cancel = cancel_on_ctrl_c();
  let stdout = std::io::stdout();
  let mut out = BufWriter::new(stdout.lock());

  let result = stores
    .events()
    .stream(&filter, &cancel, |event| -> std::io::Result<()> {
      serde_json::to_writer(&mut out, &event)?;
      out.write_all(b"\n")
    })
    .await;
  out.flush()?;

  let exported = result.context("export failed")?;
  tracing::info!(exported, "export complete");
  Ok(())
}

// ─── Retention ────────────────────────────────────────────────────────────────

pub async fn retention_show(stores: &Stores) -> anyhow::Result<()> {
  let control = stores.control();
  let policy = control.retention_policy().await?;
  let operator = control.operator_pubkey().await?;
  print_json(&json!({ "policy": policy, "operator_pubkey": operator }))
}

pub async fn retention_run(stores: &Stores) -> anyhow::Result<()> {
  let cancel = cancel_on_ctrl_c();
  let now = Utc::now().timestamp();
  match stores.apply_retention(now, &cancel).await.context("retention failed")? {
    Some(outcome) => print_json(&outcome),
    None => {
      tracing::info!("retention is disabled");
      print_json(&json!(null))
    }
  }
}

pub async fn retention_set(
  stores: &Stores,
  days: Option<u32>,
  exceptions: Option<Vec<String>>,
  honor_requests: Option<bool>,
) -> anyhow::Result<()> {
  let control = stores.control();
  let mut policy = control.retention_policy().await?;

  if let Some(days) = days {
    policy.retention_days = days;
  }
  if let Some(exceptions) = exceptions {
    for rule in &exceptions {
      rule
        .parse::<ExceptionRule>()
        .with_context(|| format!("invalid exception rule {rule:?}"))?;
    }
    policy.exceptions = exceptions;
  }
  if let Some(honor) = honor_requests {
    policy.honor_deletion_requests = honor;
  }

  if policy.exceptions.iter().any(|r| r == "pubkey:operator")
    && control.operator_pubkey().await?.is_none()
  {
    tracing::warn!("pubkey:operator has no effect until an operator pubkey is configured");
  }
  control.save_retention_policy(&policy).await?;
  print_json(&policy)
}

// ─── Deletion requests ────────────────────────────────────────────────────────

pub async fn deletions_list(
  stores: &Stores,
  status: Option<DeletionStatus>,
  limit: usize,
) -> anyhow::Result<()> {
  let control = stores.control();
  let requests = match status {
    Some(status) => control.list_by_status(status).await?,
    None => control.recent_deletion_requests(limit).await?,
  };
  print_json(&requests)
}

pub async fn deletions_request(
  stores: &Stores,
  id: String,
  reason: Option<String>,
) -> anyhow::Result<()> {
  let control = stores.control();
  let requested_by = control
    .operator_pubkey()
    .await?
    .unwrap_or_else(|| "admin".to_owned());
  let request_id = control
    .enqueue(&NewDeletionRequest::admin(id, requested_by, reason))
    .await
    .context("failed to queue deletion request")?;
  print_json(&json!({ "request_id": request_id }))
}

pub async fn deletions_collect(stores: &Stores, since: Option<i64>) -> anyhow::Result<()> {
  let cancel = cancel_on_ctrl_c();
  let summary = stores
    .collect_deletion_requests(since, &cancel)
    .await
    .context("collecting deletion events failed")?;
  print_json(&summary)
}

pub async fn deletions_process(stores: &Stores) -> anyhow::Result<()> {
  let cancel = cancel_on_ctrl_c();
  let summary = stores
    .process_deletion_requests(&cancel)
    .await
    .context("processing deletion requests failed")?;
  print_json(&summary)
}

// ─── Maintenance ──────────────────────────────────────────────────────────────

pub async fn vacuum(stores: &Stores) -> anyhow::Result<()> {
  let handle = stores
    .events()
    .open_for_write()
    .await
    .context("failed to open event store for writing")?;
  let result = handle.vacuum().await;
  handle.close().await?;
  result.context("vacuum failed")?;
  print_json(&json!({ "vacuumed": true }))
}

pub async fn integrity(stores: &Stores) -> anyhow::Result<()> {
  let handle = stores
    .events()
    .open_for_write()
    .await
    .context("failed to open event store for writing")?;
  let result = handle.integrity_check().await;
  handle.close().await?;
  let report = result.context("integrity check failed")?;

  print_json(&report)?;
  if report.as_slice() != ["ok"] {
    bail!("integrity check reported {} problem(s)", report.len());
  }
  Ok(())
}

// ─── Sync jobs ────────────────────────────────────────────────────────────────

pub async fn jobs_list(stores: &Stores, limit: usize) -> anyhow::Result<()> {
  let jobs = stores.control().list_sync_jobs(limit).await?;
  print_json(&jobs)
}
