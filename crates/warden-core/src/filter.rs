//! [`EventFilter`], the typed query accepted by the event browser, the
//! counters and the exporter.

use serde::{Deserialize, Serialize};

/// Page size used when no (or a non-positive) limit is given.
pub const DEFAULT_LIMIT: i64 = 50;

/// Hard upper bound on a single page.
pub const MAX_LIMIT: i64 = 1000;

/// Parameters for event queries. Every field is optional; an empty filter
/// matches every row.
///
/// `ids` and `authors` are 64-character hex strings and are validated when
/// the filter is translated, before any statement runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
  pub ids:      Vec<String>,
  pub authors:  Vec<String>,
  pub kinds:    Vec<u32>,
  /// Inclusive lower bound on `created_at`.
  pub since:    Option<i64>,
  /// Inclusive upper bound on `created_at`.
  pub until:    Option<i64>,
  /// Substring of the event's free-text content.
  pub search:   Option<String>,
  /// Pubkey referenced by a `p` tag.
  pub mentions: Option<String>,
  pub limit:    Option<i64>,
  pub offset:   Option<i64>,
}

impl EventFilter {
  /// The page size actually applied: always within `1..=MAX_LIMIT`.
  pub fn effective_limit(&self) -> i64 {
    match self.limit {
      Some(l) if l > MAX_LIMIT => MAX_LIMIT,
      Some(l) if l > 0 => l,
      _ => DEFAULT_LIMIT,
    }
  }

  pub fn effective_offset(&self) -> i64 { self.offset.unwrap_or(0).max(0) }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
      && self.authors.is_empty()
      && self.kinds.is_empty()
      && self.since.is_none()
      && self.until.is_none()
      && self.search.as_deref().is_none_or(str::is_empty)
      && self.mentions.is_none()
  }

  pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
    self.kinds.extend(kinds);
    self
  }

  pub fn with_authors<S: Into<String>>(mut self, authors: impl IntoIterator<Item = S>) -> Self {
    self.authors.extend(authors.into_iter().map(Into::into));
    self
  }

  pub fn with_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
    self.ids.extend(ids.into_iter().map(Into::into));
    self
  }

  pub fn between(mut self, since: Option<i64>, until: Option<i64>) -> Self {
    self.since = since;
    self.until = until;
    self
  }
}
