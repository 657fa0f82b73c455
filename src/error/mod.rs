mod app;
mod init;
mod store;

pub use app::{ApiErrorBody, AppError};
pub use init::InitError;
pub use store::StoreError;

use thiserror::Error as ThisError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// Startup configuration could not be loaded.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl IsRetryable for sqlx::Error {
    /// Everything except a malformed connection target may clear up while the
    /// database container is still starting.
    fn is_retryable(&self) -> bool {
        !matches!(self, sqlx::Error::Configuration(_))
    }
}
