use thiserror::Error as ThisError;

/// The database could not be prepared for CRUD traffic.
#[derive(Debug, ThisError)]
pub enum InitError {
    #[error("invalid database target: {0}")]
    InvalidTarget(String),

    #[error("database initialization failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: usize,
        #[source]
        source: sqlx::Error,
    },
}

impl InitError {
    /// Attempts made before giving up (zero when the target was rejected up front).
    pub fn attempts(&self) -> usize {
        match self {
            InitError::InvalidTarget(_) => 0,
            InitError::Exhausted { attempts, .. } => *attempts,
        }
    }
}
