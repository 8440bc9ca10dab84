//! SQL schema for the enrollment database.
//!
//! Executed once per connection. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

-- One row per enrolled student. `seq` preserves enrollment order for listing
-- and for matcher iteration order.
CREATE TABLE IF NOT EXISTS enrollments (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    identity    TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

-- Reference embeddings, stored as little-endian f32 blobs.
CREATE TABLE IF NOT EXISTS reference_embeddings (
    identity       TEXT NOT NULL REFERENCES enrollments(identity) ON DELETE CASCADE,
    position       INTEGER NOT NULL,
    dim            INTEGER NOT NULL,
    model_version  TEXT,
    vector         BLOB NOT NULL,
    PRIMARY KEY (identity, position)
);

PRAGMA user_version = 1;
";
