//! Dashboard statistics types and the calendar arithmetic behind the
//! time-bucketed histograms.
//!
//! Stored timestamps are UTC seconds. A caller's timezone is reduced to a
//! single fixed offset, taken at the start of the queried range, and added
//! to each timestamp before truncating it to a day or hour. Every expected
//! bucket is then materialised, with zero counts where no events fell.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Offset, TimeZone};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
  Hour,
  Day,
}

impl Granularity {
  /// `strftime` pattern producing this granularity's bucket labels.
  pub fn strftime_pattern(self) -> &'static str {
    match self {
      Self::Hour => "%Y-%m-%d %H:00",
      Self::Day => "%Y-%m-%d",
    }
  }
}

/// One histogram bucket: `YYYY-MM-DD` or `YYYY-MM-DD HH:00`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCount {
  pub date:  String,
  pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
  pub pubkey: String,
  pub count:  u64,
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOverview {
  pub total:  u64,
  /// Events created since local midnight.
  pub today:  u64,
  pub oldest: Option<i64>,
  pub newest: Option<i64>,
}

// ─── Calendar arithmetic ─────────────────────────────────────────────────────

fn utc(ts: i64) -> Result<DateTime<chrono::Utc>> {
  DateTime::from_timestamp(ts, 0).ok_or(Error::TimestampOutOfRange(ts))
}

/// Offset of `tz` from UTC, in seconds, at the instant `at`.
pub fn offset_seconds<Tz: TimeZone>(tz: &Tz, at: i64) -> Result<i32> {
  let instant = utc(at)?;
  Ok(tz.offset_from_utc_datetime(&instant.naive_utc()).fix().local_minus_utc())
}

/// The local calendar date of `ts` shifted by `offset` seconds.
pub fn local_date(ts: i64, offset: i32) -> Result<NaiveDate> {
  let shifted = ts.checked_add(i64::from(offset)).ok_or(Error::TimestampOutOfRange(ts))?;
  Ok(utc(shifted)?.date_naive())
}

/// UTC timestamp of the local midnight that starts the day containing `now`.
pub fn local_day_start<Tz: TimeZone>(tz: &Tz, now: i64) -> Result<i64> {
  Ok(day_start_with_offset(now, offset_seconds(tz, now)?))
}

/// UTC timestamp of the midnight, `offset` seconds east of UTC, that starts
/// the local day containing `ts`.
pub fn day_start_with_offset(ts: i64, offset: i32) -> i64 {
  let offset = i64::from(offset);
  let local = ts + offset;
  local - local.rem_euclid(SECONDS_PER_DAY) - offset
}

/// Every label a histogram over `[since, until]` must contain.
///
/// Hourly histograms cover the 24 hours of the local day containing
/// `since`. Daily histograms cover each local date from `since` through
/// `until`, and are empty if `until < since`.
pub fn bucket_labels(
  since: i64,
  until: i64,
  granularity: Granularity,
  offset: i32,
) -> Result<Vec<String>> {
  let first = local_date(since, offset)?;
  match granularity {
    Granularity::Hour => {
      let day = first.format("%Y-%m-%d");
      Ok((0..24).map(|h| format!("{day} {h:02}:00")).collect())
    }
    Granularity::Day => {
      if until < since {
        return Ok(Vec::new());
      }
      let last = local_date(until, offset)?;
      let mut labels = Vec::new();
      let mut day = first;
      while day <= last {
        labels.push(day.format("%Y-%m-%d").to_string());
        day += Duration::days(1);
      }
      Ok(labels)
    }
  }
}

/// Lay `counts` over `labels`, keeping label order and zero-filling gaps.
/// Counts whose label is not expected are dropped.
pub fn fill_gaps(labels: Vec<String>, counts: &HashMap<String, u64>) -> Vec<DateCount> {
  labels
    .into_iter()
    .map(|date| {
      let count = counts.get(&date).copied().unwrap_or(0);
      DateCount { date, count }
    })
    .collect()
}
