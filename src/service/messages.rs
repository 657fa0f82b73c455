use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{Message, MessageStore};
use crate::error::AppError;

/// Message CRUD with input validation in front of the store.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
}

impl MessageService {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Saves `content` as a new message and returns its id.
    pub async fn add(&self, content: Option<&str>) -> Result<i64, AppError> {
        let content = require_content(content)?;
        let id = self.store.insert(content).await?;
        debug!(id, "message saved");
        Ok(id)
    }

    /// Removes every message whose content equals `content`.
    ///
    /// Succeeds when nothing matched; returns the number of rows removed.
    pub async fn delete(&self, content: Option<&str>) -> Result<u64, AppError> {
        let content = require_content(content)?;
        let removed = self.store.delete_by_content(content).await?;
        info!(removed, "messages deleted by content");
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<Message>, AppError> {
        Ok(self.store.list().await?)
    }
}

fn require_content(content: Option<&str>) -> Result<&str, AppError> {
    match content {
        Some(c) if !c.is_empty() => Ok(c),
        _ => Err(AppError::Validation("content is required".to_string())),
    }
}
