//! `SQLite` schema definitions for the note store.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the notes table.
///
/// `created_at` holds epoch microseconds stamped at commit; `NULL` marks a
/// pending timestamp.
pub const CREATE_NOTES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    text TEXT NOT NULL CHECK (length(trim(text)) > 0),
    created_at INTEGER
)
";

/// SQL statement to create the index backing owner-scoped, newest-first queries.
pub const CREATE_OWNER_CREATED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notes_owner_created ON notes(owner_id, created_at DESC, id DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_NOTES_TABLE,
    CREATE_OWNER_CREATED_INDEX,
    CREATE_METADATA_TABLE,
];
