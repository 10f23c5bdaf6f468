use crate::cli::ServeArgs;
use crate::infra::{AppState, Collaborators};
use crate::routes::{with_service_routes, Services};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use procan_intake::config::AppConfig;
use procan_intake::error::AppError;
use procan_intake::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let collaborators = Collaborators::from_config(&config.collaborators)?;
    let services = Services::assemble(&config.collaborators, collaborators);

    let app = with_service_routes(&services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        public_origin = %config.collaborators.public_origin,
        "procan intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
