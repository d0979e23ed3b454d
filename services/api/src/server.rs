use crate::cli::ServeArgs;
use crate::infra::{auth_gate, eligibility_service, AppState};
use crate::routes::with_eligibility_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use swiftvisa::config::AppConfig;
use swiftvisa::error::AppError;
use swiftvisa::telemetry;
use tracing::info;

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

    let service = Arc::new(eligibility_service(&config)?);
    let app = with_eligibility_routes(service, auth_gate(&config))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        worker = config.worker.program.as_str(),
        max_concurrent = config.worker.max_concurrent,
        timeout_secs = config.worker.timeout.as_secs(),
        "eligibility bridge ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
