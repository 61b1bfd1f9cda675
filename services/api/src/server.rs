use crate::cli::ServeArgs;
use crate::infra::{build_decision_service, start_ingestion, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use marketplace_ai::config::AppConfig;
use marketplace_ai::decision::PersistMode;
use marketplace_ai::delivery::DeliveryClient;
use marketplace_ai::error::AppError;
use marketplace_ai::telemetry;
use std::sync::atomic::Ordering;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let delivery = Arc::new(DeliveryClient::from_config(&config.delivery));
    let service = build_decision_service(&config, delivery.clone(), PersistMode::Background);
    let ingestion = if args.no_ingestion {
        info!("ingestion disabled by flag");
        None
    } else {
        start_ingestion(&config.ingestion, service.clone(), delivery)
    };

    let app = with_operational_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        ai_enabled = config.analyzer.enabled,
        model_version = %config.model.version,
        "marketplace decision service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    readiness_flag.store(false, Ordering::Release);

    if let Some(supervisor) = ingestion {
        let aborted = supervisor.shutdown().await;
        if aborted > 0 {
            warn!(aborted, "ingestion tasks did not drain in time");
        }
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c, shutting down");
    }
    info!("shutdown requested");
}
