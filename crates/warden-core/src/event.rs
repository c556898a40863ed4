//! Events as read from the relay's store.
//!
//! The relay owns the event table; this application only reads rows and
//! deletes them. Identifiers and pubkeys are 32-byte values stored in binary
//! and displayed as lowercase hex.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Width in bytes of an event id or a pubkey.
pub const ID_LEN: usize = 32;

/// Kind of a NIP-09 deletion request event.
pub const KIND_DELETION: u32 = 5;

/// A relay event with its tags, content and signature unwrapped from the
/// stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub id:         String,
  pub pubkey:     String,
  pub created_at: i64,
  pub kind:       u32,
  pub tags:       Vec<Vec<String>>,
  pub content:    String,
  pub sig:        String,
}

impl Event {
  /// Values of every tag named `name`, in tag order.
  ///
  /// Tags with no value (a bare `["e"]`) are skipped.
  pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    self
      .tags
      .iter()
      .filter(move |t| t.first().map(String::as_str) == Some(name))
      .filter_map(|t| t.get(1).map(String::as_str))
  }
}

/// Decode a hex identifier into its fixed-width binary form.
///
/// `field` names the input in the resulting error (`"id"`, `"author"`, ...).
pub fn decode_id(field: &'static str, value: &str) -> Result<[u8; ID_LEN]> {
  let mut out = [0u8; ID_LEN];
  hex::decode_to_slice(value, &mut out).map_err(|_| Error::InvalidIdentifier {
    field,
    value: value.to_owned(),
  })?;
  Ok(out)
}

/// Encode a binary identifier as lowercase hex.
pub fn encode_id(bytes: &[u8]) -> String { hex::encode(bytes) }

/// Whether `value` is a well-formed 64-character hex identifier.
pub fn is_valid_id(value: &str) -> bool { decode_id("id", value).is_ok() }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_accepts_mixed_case_hex() {
    let hex = "AB".repeat(32);
    let bytes = decode_id("id", &hex).unwrap();
    assert!(bytes.iter().all(|b| *b == 0xab));
    assert_eq!(encode_id(&bytes), "ab".repeat(32));
  }

  #[test]
  fn decode_rejects_wrong_length_and_non_hex() {
    let short = decode_id("author", "abcd").unwrap_err();
    assert!(matches!(short, Error::InvalidIdentifier { field: "author", .. }));

    let junk = "zz".repeat(32);
    assert!(decode_id("id", &junk).is_err());
    assert!(!is_valid_id(&junk));
  }

  #[test]
  fn tag_values_skips_other_names_and_bare_tags() {
    let event = Event {
      id:         "00".repeat(32),
      pubkey:     "11".repeat(32),
      created_at: 0,
      kind:       KIND_DELETION,
      tags:       vec![
        vec!["e".into(), "aa".into()],
        vec!["p".into(), "bb".into()],
        vec!["e".into()],
        vec!["e".into(), "cc".into(), "wss://relay".into()],
      ],
      content:    String::new(),
      sig:        String::new(),
    };

    let values: Vec<_> = event.tag_values("e").collect();
    assert_eq!(values, ["aa", "cc"]);
  }
}
