//! Integration tests against a relay-shaped event database in a temporary
//! directory and a fresh control store.

mod maintenance;

use std::path::{Path, PathBuf};

use rusqlite::params;
use serde_json::json;
use tempfile::TempDir;

use crate::{StoreOptions, Stores};

/// 2024-03-10 00:00:00 UTC.
pub const MARCH_10: i64 = 1_710_028_800;

/// A 64-char hex id made of one repeated byte.
pub fn hex_id(byte: u8) -> String { format!("{byte:02x}").repeat(32) }

/// The relay's layout: events plus a cascading tag index.
const EVENT_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE event (
    id          INTEGER PRIMARY KEY,
    event_hash  BLOB NOT NULL,
    first_seen  INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    author      BLOB NOT NULL,
    kind        INTEGER NOT NULL,
    content     TEXT NOT NULL
);
CREATE UNIQUE INDEX event_hash_index ON event(event_hash);

CREATE TABLE tag (
    id        INTEGER PRIMARY KEY,
    event_id  INTEGER NOT NULL,
    name      TEXT,
    value     TEXT,
    FOREIGN KEY(event_id) REFERENCES event(id) ON UPDATE CASCADE ON DELETE CASCADE
);
";

/// Seed description for one stored event.
pub struct Seed {
  pub id:         u8,
  pub author:     u8,
  pub created_at: i64,
  pub kind:       u32,
  pub content:    String,
  pub tags:       Vec<Vec<String>>,
}

impl Seed {
  pub fn new(id: u8, author: u8, created_at: i64, kind: u32) -> Self {
    Self { id, author, created_at, kind, content: String::new(), tags: Vec::new() }
  }

  pub fn content(mut self, content: impl Into<String>) -> Self {
    self.content = content.into();
    self
  }

  pub fn tag<S: Into<String>>(mut self, tag: impl IntoIterator<Item = S>) -> Self {
    self.tags.push(tag.into_iter().map(Into::into).collect());
    self
  }
}

/// Writes to the event database the way the relay would.
pub struct Relay {
  conn: rusqlite::Connection,
}

impl Relay {
  pub fn create(path: &Path) -> Self {
    let conn = rusqlite::Connection::open(path).expect("create event db");
    conn.execute_batch(EVENT_SCHEMA).expect("event schema");
    Self { conn }
  }

  pub fn insert(&self, seed: Seed) {
    let id = hex_id(seed.id);
    let author = hex_id(seed.author);
    let payload = json!({
      "id": id,
      "pubkey": author,
      "created_at": seed.created_at,
      "kind": seed.kind,
      "tags": seed.tags,
      "content": seed.content,
      "sig": "5e".repeat(64),
    })
    .to_string();
    self.insert_raw(seed.id, seed.author, seed.created_at, seed.kind, &payload);

    let row = self.conn.last_insert_rowid();
    for tag in &seed.tags {
      self
        .conn
        .execute(
          "INSERT INTO tag (event_id, name, value) VALUES (?1, ?2, ?3)",
          params![row, tag.first(), tag.get(1)],
        )
        .expect("insert tag");
    }
  }

  /// Insert a row with an arbitrary payload column.
  pub fn insert_raw(&self, id: u8, author: u8, created_at: i64, kind: u32, payload: &str) {
    self
      .conn
      .execute(
        "INSERT INTO event (event_hash, created_at, author, kind, content)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![vec![id; 32], created_at, vec![author; 32], kind, payload],
      )
      .expect("insert event");
  }

  /// `n` synthetic kind-1 events one second apart from `start`, all by
  /// the zero author.
  pub fn bulk(&self, n: i64, start: i64) {
    self
      .conn
      .execute(
        "INSERT INTO event (event_hash, created_at, author, kind, content)
         SELECT randomblob(32), ?2 + x, zeroblob(32), 1, '{\"content\":\"bulk\"}'
         FROM (WITH RECURSIVE n(x) AS (SELECT 0 UNION ALL SELECT x + 1 FROM n LIMIT ?1)
               SELECT x FROM n)",
        params![n, start],
      )
      .expect("bulk insert");
  }

  pub fn count(&self, table: &str) -> i64 {
    self
      .conn
      .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
      .expect("count rows")
  }

  /// Stored ids, as the single repeated byte each was seeded with.
  pub fn ids(&self) -> Vec<u8> {
    let mut stmt = self
      .conn
      .prepare("SELECT event_hash FROM event ORDER BY id")
      .expect("prepare");
    stmt
      .query_map([], |row| row.get::<_, Vec<u8>>(0))
      .expect("query ids")
      .map(|r| r.expect("id row")[0])
      .collect()
  }
}

/// A control store and a live event database side by side.
pub struct Fixture {
  pub _dir:   TempDir,
  pub relay:  Relay,
  pub stores: Stores,
}

impl Fixture {
  pub async fn new() -> Self {
    let dir = tempfile::tempdir().expect("tempdir");
    let relay = Relay::create(&dir.path().join("nostr.db"));
    let stores = open_stores(dir.path()).await;
    Self { _dir: dir, relay, stores }
  }

  /// A fixture already holding `seeds`.
  pub async fn seeded(seeds: impl IntoIterator<Item = Seed>) -> Self {
    let dir = tempfile::tempdir().expect("tempdir");
    let relay = Relay::create(&dir.path().join("nostr.db"));
    for seed in seeds {
      relay.insert(seed);
    }
    let stores = open_stores(dir.path()).await;
    Self { _dir: dir, relay, stores }
  }
}

pub fn event_path(dir: &Path) -> PathBuf { dir.join("nostr.db") }

pub async fn open_stores(dir: &Path) -> Stores {
  let options = StoreOptions { reader_connections: 2, ..Default::default() };
  Stores::open(dir.join("control").join("warden.db"), event_path(dir), options)
    .await
    .expect("open stores")
}
