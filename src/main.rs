use mimalloc::MiMalloc;
use postbox::config::Config;
use postbox::db::{self, Database};
use postbox::metrics::MetricsRegistry;
use postbox::server::{AppState, app_router};
use postbox::utils::logging;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    logging::init(&cfg.server.loglevel);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.server.worker_threads)
        .enable_all()
        .build()?
        .block_on(run(cfg))
}

async fn run(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen_addr = %cfg.server.listen_addr,
        listen_port = cfg.server.listen_port,
        app_env = %cfg.server.app_env,
        worker_id = %cfg.server.worker_id(),
        database = %cfg.database.redacted_target(),
        loglevel = %cfg.server.loglevel,
        "starting postbox"
    );
    logging::with_pretty_json_debug(&cfg.redacted(), |json| {
        debug!(config = %json, "effective configuration");
    });

    let db = match db::connect(&cfg.database).await {
        Ok(db) => db,
        Err(e) if !cfg.database.required => {
            warn!(error = %e, "database unavailable; serving in degraded mode");
            Database::unavailable(e.to_string())
        }
        Err(e) => {
            error!(error = %e, attempts = e.attempts(), "database initialization failed");
            return Err(e.into());
        }
    };

    let metrics = MetricsRegistry::from_config(&cfg.metrics);
    let flusher = metrics.spawn_flusher(Duration::from_millis(cfg.metrics.flush_interval_ms));

    let state = AppState::new(&cfg, &db, metrics.clone());
    let app = app_router(state);

    let addr = SocketAddr::from((cfg.server.listen_addr, cfg.server.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(flusher) = flusher {
        flusher.abort();
        tokio::task::spawn_blocking(move || metrics.publish()).await?;
    }
    db.close().await;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
