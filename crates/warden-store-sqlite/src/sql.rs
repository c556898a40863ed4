//! A small predicate builder for dynamically composed statements.
//!
//! Clauses are kept alongside their bound values so the final statement is
//! always parameterised with anonymous `?` placeholders, in push order.

use std::{ffi::c_int, panic::AssertUnwindSafe};

use rusqlite::{Connection, types::Value};
use tokio_util::sync::CancellationToken;
use warden_core::{
  Result,
  event::{decode_id, encode_id},
  filter::EventFilter,
};

/// `AND`-joined predicates and the values bound to their placeholders.
#[derive(Debug, Default, Clone)]
pub(crate) struct Predicates {
  clauses: Vec<String>,
  params:  Vec<Value>,
}

impl Predicates {
  /// Add a clause containing exactly one `?`.
  pub fn push(&mut self, clause: &str, param: impl Into<Value>) -> &mut Self {
    self.clauses.push(clause.to_owned());
    self.params.push(param.into());
    self
  }

  /// `column IN (?, ...)`; omitted entirely when `values` is empty.
  pub fn push_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
    self.push_list(column, "IN", values)
  }

  /// `column NOT IN (?, ...)`; omitted entirely when `values` is empty.
  pub fn push_not_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
    self.push_list(column, "NOT IN", values)
  }

  fn push_list(&mut self, column: &str, op: &str, values: Vec<Value>) -> &mut Self {
    if values.is_empty() {
      return self;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    self.clauses.push(format!("{column} {op} ({placeholders})"));
    self.params.extend(values);
    self
  }

  /// Optional-range helper: `column >= since` and `column <= until`.
  pub fn push_range(&mut self, column: &str, since: Option<i64>, until: Option<i64>) -> &mut Self {
    if let Some(since) = since {
      self.push(&format!("{column} >= ?"), since);
    }
    if let Some(until) = until {
      self.push(&format!("{column} <= ?"), until);
    }
    self
  }

  pub fn is_empty(&self) -> bool { self.clauses.is_empty() }

  /// `" WHERE a AND b"`, or the empty string when there are no clauses.
  pub fn where_clause(&self) -> String {
    if self.clauses.is_empty() {
      String::new()
    } else {
      format!(" WHERE {}", self.clauses.join(" AND "))
    }
  }

  pub fn params(&self) -> &[Value] { &self.params }

  /// Translate an [`EventFilter`] into predicates over the `event` table.
  ///
  /// Hex ids and authors are decoded first; a malformed value is rejected
  /// here, before any statement is prepared. Limit and offset are not part
  /// of the predicate set.
  pub fn from_filter(filter: &EventFilter) -> Result<Self> {
    let ids = decode_all("id", &filter.ids)?;
    let authors = decode_all("author", &filter.authors)?;
    let mentions = filter
      .mentions
      .as_deref()
      .map(|m| decode_id("mentions", m).map(|bytes| encode_id(&bytes)))
      .transpose()?;

    let mut p = Self::default();
    p.push_in("event_hash", ids);
    p.push_in("author", authors);
    p.push_in("kind", filter.kinds.iter().map(|k| Value::Integer(i64::from(*k))).collect());
    p.push_range("created_at", filter.since, filter.until);

    if let Some(needle) = filter.search.as_deref().filter(|s| !s.is_empty()) {
      p.push(
        "(CASE WHEN json_valid(content) THEN json_extract(content, '$.content') ELSE content END) \
         LIKE ? ESCAPE '\\'",
        format!("%{}%", escape_like(needle)),
      );
    }
    if let Some(pubkey) = mentions {
      // Textual match on the canonical encoding of a ["p", "<hex>", ...] tag.
      p.push("content LIKE ?", format!("%[\"p\",\"{pubkey}\"%"));
    }
    Ok(p)
  }
}

fn decode_all(field: &'static str, values: &[String]) -> Result<Vec<Value>> {
  values
    .iter()
    .map(|v| decode_id(field, v).map(|bytes| Value::Blob(bytes.to_vec())))
    .collect()
}

/// Virtual machine steps between cancellation checks inside one statement.
const CANCEL_CHECK_STEPS: c_int = 1_000;

/// Run `f` with a progress handler that interrupts the running statement
/// once `cancel` fires, so a long scan or sort stops before its first row.
///
/// The interrupted statement fails with `SQLITE_INTERRUPT`, which
/// [`StorageContext::during`](crate::error::StorageContext::during) reports
/// as [`Error::Cancelled`](crate::Error::Cancelled). The handler is removed
/// before returning; reader connections are shared.
pub(crate) fn interruptible<T>(
  conn: &Connection,
  cancel: &CancellationToken,
  f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
  let token = AssertUnwindSafe(cancel.clone());
  conn.progress_handler(CANCEL_CHECK_STEPS, Some(move || token.is_cancelled()));
  let result = f(conn);
  conn.progress_handler(0, None::<fn() -> bool>);
  result
}

/// Escape `LIKE` metacharacters for use with `ESCAPE '\'`.
pub(crate) fn escape_like(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '\\' | '%' | '_') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}
