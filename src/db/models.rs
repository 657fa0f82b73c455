use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the `messages` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct Message {
    pub id: i64,
    pub content: String,
}
