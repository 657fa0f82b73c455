use backon::{
    BackoffBuilder, ConstantBackoff, ConstantBuilder, ExponentialBackoff, ExponentialBuilder,
    Retryable,
};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{PgPool, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Backoff, DatabaseConfig, RetryConfig};
use crate::db::schema::{POSTGRES_INIT, SQLITE_INIT};
use crate::db::store::{MessageStore, PgMessageStore, SqliteMessageStore, UnavailableStore};
use crate::error::{InitError, IsRetryable};

/// Retry schedule for database initialization, built from [`RetryConfig`].
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    Fixed(ConstantBuilder),
    Exponential(ExponentialBuilder),
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        // `max_times` counts retries, not attempts.
        let retries = cfg.max_attempts.saturating_sub(1);
        let delay = Duration::from_millis(cfg.delay_ms);
        match cfg.backoff {
            Backoff::Fixed => RetryPolicy::Fixed(
                ConstantBuilder::default()
                    .with_delay(delay)
                    .with_max_times(retries),
            ),
            Backoff::Exponential => RetryPolicy::Exponential(
                ExponentialBuilder::default()
                    .with_min_delay(delay)
                    .with_max_delay(Duration::from_millis(cfg.max_delay_ms.max(cfg.delay_ms)))
                    .with_max_times(retries),
            ),
        }
    }
}

#[derive(Debug)]
pub enum RetryBackoff {
    Fixed(ConstantBackoff),
    Exponential(ExponentialBackoff),
}

impl Iterator for RetryBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        match self {
            RetryBackoff::Fixed(b) => b.next(),
            RetryBackoff::Exponential(b) => b.next(),
        }
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = RetryBackoff;

    fn build(self) -> Self::Backoff {
        match self {
            RetryPolicy::Fixed(b) => RetryBackoff::Fixed(b.build()),
            RetryPolicy::Exponential(b) => RetryBackoff::Exponential(b.build()),
        }
    }
}

enum Target {
    Postgres(PgConnectOptions),
    Sqlite(SqliteConnectOptions),
}

fn resolve_target(cfg: &DatabaseConfig) -> Result<Target, InitError> {
    match cfg.url_override() {
        Some(url) if url.starts_with("sqlite:") => {
            let opts = SqliteConnectOptions::from_str(url)
                .map_err(|e| InitError::InvalidTarget(e.to_string()))?
                .create_if_missing(true)
                .busy_timeout(Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            Ok(Target::Sqlite(opts))
        }
        Some(url) => PgConnectOptions::from_str(url)
            .map(Target::Postgres)
            .map_err(|e| InitError::InvalidTarget(e.to_string())),
        None => Ok(Target::Postgres(
            PgConnectOptions::new()
                .host(&cfg.host)
                .port(cfg.port)
                .username(&cfg.user)
                .password(&cfg.password)
                .database(&cfg.name),
        )),
    }
}

#[derive(Clone)]
enum Pool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Initialized database: the pool plus the store built on it.
///
/// Constructed once at startup and injected into the router state.
#[derive(Clone)]
pub struct Database {
    pool: Option<Pool>,
    store: Arc<dyn MessageStore>,
}

impl Database {
    /// Degraded stand-in: every store call fails with `StoreError::Unavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            pool: None,
            store: Arc::new(UnavailableStore::new(reason)),
        }
    }

    pub fn store(&self) -> Arc<dyn MessageStore> {
        Arc::clone(&self.store)
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    /// Waits for checked-out connections to return, then closes the pool.
    pub async fn close(&self) {
        match &self.pool {
            Some(Pool::Postgres(pool)) => pool.close().await,
            Some(Pool::Sqlite(pool)) => pool.close().await,
            None => {}
        }
    }
}

async fn apply_pg_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for stmt in POSTGRES_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

async fn apply_sqlite_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

/// One attempt: open a pool and apply the schema. A pool whose schema step
/// fails is closed before returning so retries never pile up connections.
async fn open(target: &Target, cfg: &DatabaseConfig) -> Result<Database, sqlx::Error> {
    let acquire_timeout = Duration::from_millis(cfg.acquire_timeout_ms);
    match target {
        Target::Postgres(opts) => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect_with(opts.clone())
                .await?;
            if let Err(e) = apply_pg_schema(&pool).await {
                pool.close().await;
                return Err(e);
            }
            Ok(Database {
                store: Arc::new(PgMessageStore::new(pool.clone())),
                pool: Some(Pool::Postgres(pool)),
            })
        }
        Target::Sqlite(opts) => {
            let pool = SqlitePoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect_with(opts.clone())
                .await?;
            if let Err(e) = apply_sqlite_schema(&pool).await {
                pool.close().await;
                return Err(e);
            }
            Ok(Database {
                store: Arc::new(SqliteMessageStore::new(pool.clone())),
                pool: Some(Pool::Sqlite(pool)),
            })
        }
    }
}

/// Connects to the configured database and guarantees the `messages` table
/// exists, retrying per `cfg.retry`.
///
/// Safe to call more than once against the same database.
pub async fn connect(cfg: &DatabaseConfig) -> Result<Database, InitError> {
    let target = resolve_target(cfg)?;
    let redacted = cfg.redacted_target();
    let max_attempts = cfg.retry.max_attempts.max(1);
    let attempts = AtomicUsize::new(0);

    info!(db = %redacted, max_attempts, "initializing database");

    let target_ref = &target;
    let attempts_ref = &attempts;
    let opened = (|| async move {
        attempts_ref.fetch_add(1, Ordering::Relaxed);
        open(target_ref, cfg).await
    })
    .retry(RetryPolicy::from_config(&cfg.retry))
    .when(|err: &sqlx::Error| err.is_retryable())
    .notify(|err: &sqlx::Error, delay: Duration| {
        warn!(
            attempt = attempts_ref.load(Ordering::Relaxed),
            max_attempts,
            db = %redacted,
            error = %err,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "database not ready; retrying"
        );
    })
    .await;

    let attempts = attempts.load(Ordering::Relaxed);
    match opened {
        Ok(db) => {
            info!(db = %redacted, attempts, "database ready");
            Ok(db)
        }
        Err(source) => Err(InitError::Exhausted { attempts, source }),
    }
}
