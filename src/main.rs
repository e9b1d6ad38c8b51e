use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tripj::clock::SystemClock;
use tripj::config::AppConfig;
use tripj::db::{init_pool, migrate};
use tripj::error::AppError;
use tripj::routes::create_router;
use tripj::services::{store::SqliteTripStore, sweep, trips::TripService};
use tripj::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let db = init_pool(&config.database_url, config.max_connections).await?;

    if let Err(err) = migrate(&db).await {
        error!("migration failed: {err:?}");
        return Err(err);
    }

    let store = Arc::new(SqliteTripStore::new(db.clone()));
    let trips = TripService::new(store, Arc::new(SystemClock));

    if config.sweep_on_startup {
        match trips.force_sweep().await {
            Ok(report) => info!(archived = report.archived, "startup sweep done"),
            Err(err) => warn!("startup sweep failed: {err}"),
        }
    }
    let scheduler = sweep::spawn_daily(trips.sweeper().clone(), config.sweep_at);
    info!("daily sweep scheduled at {}", config.sweep_at);

    let state = AppState::new(trips);
    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    db.close().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tripj=debug,tower_http=info".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
