use async_trait::async_trait;
use sqlx::{PgPool, SqlitePool};

use crate::db::models::Message;
use crate::error::StoreError;

/// Statements against the `messages` table.
///
/// Every call borrows one pooled connection for a single statement; sqlx
/// returns it to the pool on every exit path.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a row and return its id.
    async fn insert(&self, content: &str) -> Result<i64, StoreError>;

    /// Delete every row whose content equals `content`; returns rows removed.
    async fn delete_by_content(&self, content: &str) -> Result<u64, StoreError>;

    /// All rows in insertion (id) order.
    async fn list(&self) -> Result<Vec<Message>, StoreError>;
}

pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, content: &str) -> Result<i64, StoreError> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO messages (content) VALUES ($1) RETURNING id::BIGINT")
                .bind(content)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    async fn delete_by_content(&self, content: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE content = $1")
            .bind(content)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, Message>(
            "SELECT id::BIGINT AS id, content FROM messages ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, content: &str) -> Result<i64, StoreError> {
        let result = sqlx::query("INSERT INTO messages (content) VALUES (?)")
            .bind(content)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn delete_by_content(&self, content: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE content = ?")
            .bind(content)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, Message>("SELECT id, content FROM messages ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Stand-in used when the service runs degraded without a database.
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl MessageStore for UnavailableStore {
    async fn insert(&self, _content: &str) -> Result<i64, StoreError> {
        self.fail()
    }

    async fn delete_by_content(&self, _content: &str) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn list(&self) -> Result<Vec<Message>, StoreError> {
        self.fail()
    }
}
