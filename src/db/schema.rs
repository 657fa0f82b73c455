//! SQL DDL for initializing the database schema.
//! Every statement is idempotent, so applying it on each start is safe.

/// Postgres schema: the `messages` table.
pub const POSTGRES_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id SERIAL PRIMARY KEY,
    content TEXT NOT NULL
);
"#;

/// SQLite flavour of the same table, used for local runs and tests.
/// `AUTOINCREMENT` keeps ids monotonic even after the newest row is deleted.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL
);
"#;
