use crate::cli::ServeArgs;
use crate::infra::{open_store, seed, AppState, StoreHandle};
use crate::routes::with_classbook_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use classbook::accounts::{InviteRepository, UserRepository};
use classbook::booking::{ClassRepository, EnrollmentRepository};
use classbook::config::AppConfig;
use classbook::error::AppError;
use classbook::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    args.storage.apply(&mut config)?;

    telemetry::init(&config.telemetry)?;

    match open_store(&config.storage.backend)? {
        StoreHandle::Memory(store) => serve(config, store).await,
        StoreHandle::Sqlite(store) => serve(config, store).await,
    }
}

async fn serve<S>(config: AppConfig, store: Arc<S>) -> Result<(), AppError>
where
    S: ClassRepository + EnrollmentRepository + UserRepository + InviteRepository + 'static,
{
    seed(store.as_ref(), &config.seed)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_classbook_routes(store)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, backend = ?config.storage.backend, "class booking service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(readiness_flag))
        .await?;
    info!("class booking service stopped");
    Ok(())
}

async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown requested; draining connections");
}
