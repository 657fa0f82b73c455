//! Database module: connection, schema and the `messages` store.
//!
//! Layout:
//! - `connect.rs`: pool construction with bounded retry, schema bootstrap
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL (Postgres, plus SQLite for local runs)
//! - `store.rs`: CRUD statements behind the `MessageStore` trait

pub mod connect;
pub mod models;
pub mod schema;
pub mod store;

pub use connect::{Database, RetryPolicy, connect};
pub use models::Message;
pub use schema::{POSTGRES_INIT, SQLITE_INIT};
pub use store::{MessageStore, PgMessageStore, SqliteMessageStore, UnavailableStore};
