//! Retention policy and exception rules.
//!
//! Exception rules are persisted as plain strings (`kind:<N>`,
//! `pubkey:<hex>` or `pubkey:operator`) and resolved into an
//! [`ExclusionSet`] each time retention runs. The `operator` token is bound
//! to whatever operator pubkey is configured at that moment.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  event::{ID_LEN, decode_id},
};

const SECONDS_PER_DAY: i64 = 86_400;

// ─── Exception rules ─────────────────────────────────────────────────────────

/// One parsed exception rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionRule {
  /// Keep every event of this kind.
  Kind(u32),
  /// Keep every event by this author (lowercase hex).
  Pubkey(String),
  /// Keep every event by the operator configured at evaluation time.
  Operator,
}

impl FromStr for ExceptionRule {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidExceptionRule(s.to_owned());
    let (prefix, value) = s.trim().split_once(':').ok_or_else(invalid)?;

    match (prefix, value.trim()) {
      ("kind", n) => n.parse().map(Self::Kind).map_err(|_| invalid()),
      ("pubkey", "operator") => Ok(Self::Operator),
      ("pubkey", hex) => {
        decode_id("pubkey", hex).map_err(|_| invalid())?;
        Ok(Self::Pubkey(hex.to_ascii_lowercase()))
      }
      _ => Err(invalid()),
    }
  }
}

impl fmt::Display for ExceptionRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Kind(k) => write!(f, "kind:{k}"),
      Self::Pubkey(p) => write!(f, "pubkey:{p}"),
      Self::Operator => f.write_str("pubkey:operator"),
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Kinds and authors exempt from a retention run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
  pub kinds:   BTreeSet<u32>,
  pub authors: BTreeSet<[u8; ID_LEN]>,
  /// Rule strings that were ignored: malformed entries, and `pubkey:operator`
  /// when no usable operator pubkey is configured.
  pub skipped: Vec<String>,
}

impl ExclusionSet {
  /// Resolve persisted rule strings against the current operator pubkey.
  ///
  /// Never fails: a bad rule is recorded in `skipped` and contributes no
  /// exclusion, so one typo cannot block retention as a whole.
  pub fn resolve<S: AsRef<str>>(rules: &[S], operator: Option<&str>) -> Self {
    let operator = operator
      .map(str::trim)
      .filter(|o| !o.is_empty())
      .and_then(|o| decode_id("operator", o).ok());

    let mut set = Self::default();
    for raw in rules {
      let raw = raw.as_ref();
      match raw.parse::<ExceptionRule>() {
        Ok(ExceptionRule::Kind(k)) => {
          set.kinds.insert(k);
        }
        Ok(ExceptionRule::Pubkey(hex)) => {
          // Validated during parsing.
          if let Ok(bytes) = decode_id("pubkey", &hex) {
            set.authors.insert(bytes);
          }
        }
        Ok(ExceptionRule::Operator) => match operator {
          Some(bytes) => {
            set.authors.insert(bytes);
          }
          None => set.skipped.push(raw.to_owned()),
        },
        Err(_) => set.skipped.push(raw.to_owned()),
      }
    }
    set
  }

  pub fn is_empty(&self) -> bool { self.kinds.is_empty() && self.authors.is_empty() }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Retention settings as persisted in the control store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
  /// Age in days after which events are deleted; `0` disables retention.
  pub retention_days:          u32,
  /// Exception rule strings, in the order the operator saved them.
  pub exceptions:              Vec<String>,
  /// Whether protocol-submitted deletion requests are carried out.
  pub honor_deletion_requests: bool,
  /// Unix seconds of the last completed retention run.
  pub last_run:                Option<i64>,
}

impl RetentionPolicy {
  pub fn is_enabled(&self) -> bool { self.retention_days > 0 }

  /// The `created_at` cutoff for a run at `now`, or `None` when disabled.
  pub fn cutoff(&self, now: i64) -> Option<i64> {
    self
      .is_enabled()
      .then(|| now.saturating_sub(i64::from(self.retention_days) * SECONDS_PER_DAY))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn op() -> String { "ab".repeat(32) }

  #[test]
  fn parses_each_rule_form() {
    assert_eq!("kind:0".parse::<ExceptionRule>().unwrap(), ExceptionRule::Kind(0));
    assert_eq!(
      "pubkey:operator".parse::<ExceptionRule>().unwrap(),
      ExceptionRule::Operator
    );
    let upper = format!("pubkey:{}", op().to_uppercase());
    assert_eq!(upper.parse::<ExceptionRule>().unwrap(), ExceptionRule::Pubkey(op()));
  }

  #[test]
  fn rejects_malformed_rules() {
    for bad in ["", "kind", "kind:x", "kind:-1", "pubkey:abc", "author:00", "kind 1"] {
      assert!(bad.parse::<ExceptionRule>().is_err(), "{bad:?} should not parse");
    }
  }

  #[test]
  fn display_round_trips_through_parse() {
    for rule in [ExceptionRule::Kind(3), ExceptionRule::Operator, ExceptionRule::Pubkey(op())] {
      assert_eq!(rule.to_string().parse::<ExceptionRule>().unwrap(), rule);
    }
  }

  #[test]
  fn resolve_binds_operator_and_skips_bad_rules() {
    let rules = ["kind:0", "pubkey:operator", "garbage", "kind:7"];
    let set = ExclusionSet::resolve(&rules, Some(&op()));

    assert_eq!(set.kinds.iter().copied().collect::<Vec<_>>(), [0, 7]);
    assert_eq!(set.authors.len(), 1);
    assert!(set.authors.contains(&[0xab; ID_LEN]));
    assert_eq!(set.skipped, ["garbage"]);
  }

  #[test]
  fn operator_rule_without_operator_excludes_nothing() {
    let set = ExclusionSet::resolve(&["pubkey:operator"], None);
    assert!(set.is_empty());
    assert_eq!(set.skipped, ["pubkey:operator"]);

    let set = ExclusionSet::resolve(&["pubkey:operator"], Some("not-hex"));
    assert!(set.is_empty());
  }

  #[test]
  fn cutoff_is_none_when_disabled() {
    let mut policy = RetentionPolicy::default();
    assert_eq!(policy.cutoff(1_000_000), None);

    policy.retention_days = 2;
    assert_eq!(policy.cutoff(1_000_000), Some(1_000_000 - 2 * 86_400));
  }
}
