//! SQL schema for the control store.
//!
//! Executed once at connection startup. The version lives in
//! `PRAGMA user_version`; future migrations will be gated on it. The event
//! store's schema belongs to the relay and is never created or altered here.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS settings (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  INTEGER NOT NULL     -- unix seconds
);

-- Audit trail: rows are updated once on processing and never deleted.
CREATE TABLE IF NOT EXISTS deletion_requests (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id      TEXT NOT NULL UNIQUE,   -- kind-5 event id or 'admin-<uuid>'
    requested_by  TEXT NOT NULL,
    target_ids    TEXT NOT NULL,          -- JSON array of hex ids
    reason        TEXT,
    status        TEXT NOT NULL DEFAULT 'pending'
                  CHECK (status IN ('pending', 'processed', 'failed')),
    received_at   INTEGER NOT NULL,
    processed_at  INTEGER,
    deleted_count INTEGER NOT NULL DEFAULT 0
);

-- At most one 'running' job is a caller convention, not a constraint.
CREATE TABLE IF NOT EXISTS sync_jobs (
    id             TEXT PRIMARY KEY,
    status         TEXT NOT NULL DEFAULT 'running'
                   CHECK (status IN ('running', 'completed', 'failed', 'cancelled')),
    pubkeys        TEXT NOT NULL,         -- JSON array
    relays         TEXT NOT NULL,         -- JSON array
    kinds          TEXT,                  -- JSON array or NULL for all kinds
    since          INTEGER,
    events_fetched INTEGER NOT NULL DEFAULT 0,
    events_stored  INTEGER NOT NULL DEFAULT 0,
    events_skipped INTEGER NOT NULL DEFAULT 0,
    error          TEXT,
    started_at     INTEGER NOT NULL,
    finished_at    INTEGER
);

CREATE INDEX IF NOT EXISTS deletion_requests_status_idx ON deletion_requests(status);
CREATE INDEX IF NOT EXISTS sync_jobs_started_idx        ON sync_jobs(started_at);

PRAGMA user_version = 1;
";
