//! revenue-pulse server binary.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use revenue_pulse::app::{router, ServiceSettings, Services, Stores};
use revenue_pulse::adapters::notifications::HttpNotificationSink;
use revenue_pulse::config::AppConfig;
use revenue_pulse::domain::foundation::Timestamp;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let stores = match config.database.url() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .min_connections(config.database.min_connections)
                .max_connections(config.database.max_connections)
                .acquire_timeout(config.database.acquire_timeout())
                .idle_timeout(config.database.idle_timeout())
                .connect(url)
                .await?;
            if config.database.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
                info!("Database migrations applied");
            }
            Stores::postgres(pool)
        }
        None => {
            warn!("No database configured, using in-memory stores (state is lost on restart)");
            Stores::in_memory()
        }
    };

    let sink = Arc::new(HttpNotificationSink::new(
        config.notifications.endpoints(),
        config.notifications.auth_token.clone(),
        config.notifications.attempt_timeout(),
    )?);
    let settings = ServiceSettings::from_config(&config)?;
    let (services, delivery_queue) = Services::build(&stores, sink, settings);

    // Nothing is in flight yet, so every unapplied claim belongs to a previous process.
    match services.recovery.run_pass(Timestamp::now()).await {
        Ok(report) => info!(
            recovered = report.recovered,
            failed = report.failed,
            "Startup recovery complete"
        ),
        Err(e) => error!(error = %e, "Startup recovery failed"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = services.spawn_workers(delivery_queue, shutdown_rx);

    let app = router(&services, &config.server);
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Revenue pulse listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining background workers");
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Worker ended abnormally");
        }
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
