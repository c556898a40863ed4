//! Dashboard aggregates over the relay's `event` table.
//!
//! Counting and bucketing happen in SQL; only one row per bucket, kind or
//! author crosses to Rust.

use std::collections::{BTreeMap, HashMap};

use chrono::TimeZone;
use rusqlite::params_from_iter;
use tokio_util::sync::CancellationToken;
use warden_core::{
  event::encode_id,
  stats::{
    AuthorCount, DateCount, EventOverview, Granularity, bucket_labels, day_start_with_offset,
    fill_gaps, local_day_start, offset_seconds,
  },
};

use crate::{
  Error, EventStore, Result,
  error::StorageContext as _,
  sql::{Predicates, interruptible},
};

const SECONDS_PER_DAY: i64 = 86_400;

fn to_u64(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

impl EventStore {
  /// Headline numbers: total events, events since local midnight of `now`
  /// in `tz`, and the oldest/newest `created_at`.
  pub async fn overview<Tz: TimeZone>(
    &self,
    now: i64,
    tz: &Tz,
    cancel: &CancellationToken,
  ) -> Result<EventOverview> {
    let day_start = local_day_start(tz, now)?;
    let conn = self.reader()?;
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    let cancel = cancel.clone();
    let (total, today, oldest, newest): (i64, Option<i64>, Option<i64>, Option<i64>) = conn
      .call(move |conn| {
        Ok(interruptible(conn, &cancel, |conn| {
          conn.query_row(
            "SELECT COUNT(*),
                    SUM(CASE WHEN created_at >= ?1 THEN 1 ELSE 0 END),
                    MIN(created_at),
                    MAX(created_at)
             FROM event",
            rusqlite::params![day_start],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
          )
        })?)
      })
      .await
      .during("event overview")?;

    Ok(EventOverview {
      total: to_u64(total),
      today: to_u64(today.unwrap_or(0)),
      oldest,
      newest,
    })
  }

  /// Event counts per time bucket in the caller's timezone, gap-filled.
  ///
  /// The UTC offset of `tz` at `since` applies to the whole range. Hourly
  /// results always hold the 24 hours of the local day containing `since`;
  /// daily results hold every local date from `since` to `until` inclusive.
  pub async fn events_over_time<Tz: TimeZone>(
    &self,
    since: i64,
    until: i64,
    granularity: Granularity,
    tz: &Tz,
    cancel: &CancellationToken,
  ) -> Result<Vec<DateCount>> {
    let offset = offset_seconds(tz, since)?;
    let labels = bucket_labels(since, until, granularity, offset)?;

    let (lower, upper) = match granularity {
      Granularity::Hour => {
        let day_start = day_start_with_offset(since, offset);
        (since.max(day_start), until.min(day_start + SECONDS_PER_DAY - 1))
      }
      Granularity::Day => (since, until),
    };

    let mut predicates = Predicates::default();
    predicates.push_range("created_at", Some(lower), Some(upper));
    let sql = format!(
      "SELECT strftime('{}', created_at + {offset}, 'unixepoch') AS bucket, COUNT(*)
       FROM event{}
       GROUP BY bucket",
      granularity.strftime_pattern(),
      predicates.where_clause()
    );

    let counts = self.grouped_counts(sql, predicates, cancel, "events over time").await?;
    let counts: HashMap<String, u64> = counts.into_iter().collect();
    Ok(fill_gaps(labels, &counts))
  }

  /// Event counts per kind within the optional range.
  pub async fn events_by_kind(
    &self,
    since: Option<i64>,
    until: Option<i64>,
    cancel: &CancellationToken,
  ) -> Result<BTreeMap<u32, u64>> {
    let mut predicates = Predicates::default();
    predicates.push_range("created_at", since, until);
    let sql = format!("SELECT kind, COUNT(*) FROM event{} GROUP BY kind", predicates.where_clause());

    let rows: Vec<(u32, u64)> = self.grouped_counts(sql, predicates, cancel, "events by kind").await?;
    Ok(rows.into_iter().collect())
  }

  /// The `limit` most prolific authors within the optional range.
  ///
  /// Authors with equal counts come back in storage order.
  pub async fn top_authors(
    &self,
    limit: usize,
    since: Option<i64>,
    until: Option<i64>,
    cancel: &CancellationToken,
  ) -> Result<Vec<AuthorCount>> {
    let mut predicates = Predicates::default();
    predicates.push_range("created_at", since, until);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let sql = format!(
      "SELECT author, COUNT(*) AS n FROM event{} GROUP BY author ORDER BY n DESC LIMIT {limit}",
      predicates.where_clause()
    );

    let rows: Vec<(Vec<u8>, u64)> = self.grouped_counts(sql, predicates, cancel, "top authors").await?;
    Ok(
      rows
        .into_iter()
        .map(|(author, count)| AuthorCount { pubkey: encode_id(&author), count })
        .collect(),
    )
  }

  /// Run a two-column `key, COUNT(*)` statement, checking `cancel` while
  /// the engine groups and between result rows.
  async fn grouped_counts<K>(
    &self,
    sql: String,
    predicates: Predicates,
    cancel: &CancellationToken,
    op: &'static str,
  ) -> Result<Vec<(K, u64)>>
  where
    K: rusqlite::types::FromSql + Send + 'static,
  {
    let conn = self.reader()?;
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }
    tracing::debug!(%sql, op, "running aggregate");

    let cancel = cancel.clone();
    let rows: Option<Vec<(K, i64)>> = conn
      .call(move |conn| {
        Ok(interruptible(conn, &cancel, |conn| {
          let mut stmt = conn.prepare(&sql)?;
          let mut rows = stmt.query(params_from_iter(predicates.params().iter()))?;
          let mut out = Vec::new();
          while let Some(row) = rows.next()? {
            if cancel.is_cancelled() {
              return Ok(None);
            }
            out.push((row.get(0)?, row.get(1)?));
          }
          Ok(Some(out))
        })?)
      })
      .await
      .during(op)?;

    let rows = rows.ok_or(Error::Cancelled)?;
    Ok(rows.into_iter().map(|(k, n)| (k, to_u64(n))).collect())
  }
}
