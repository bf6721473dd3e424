//! v001 -- Initial schema creation.
//!
//! Accounts are stored as whole JSON documents keyed by id. `username` and
//! `token` are copied out of the document so lookups by login name or access
//! token don't need to decode every row.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,
    username   TEXT,
    token      TEXT,
    document   TEXT NOT NULL,                 -- full persisted account JSON
    updated_at TEXT NOT NULL                  -- ISO-8601 / RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users (username);
CREATE INDEX IF NOT EXISTS idx_users_token ON users (token);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
