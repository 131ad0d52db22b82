use crate::cli::ServeArgs;
use crate::infra::{storage_gateway, AppState};
use crate::routes::with_quote_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use quote_intake::config::AppConfig;
use quote_intake::error::AppError;
use quote_intake::telemetry;
use quote_intake::workflows::quote::QuoteIntakeService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
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

    let gateway = Arc::new(storage_gateway(&config.storage));
    let storage_configured = gateway.is_configured();

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        storage_configured,
    };

    let quote_service =
        Arc::new(QuoteIntakeService::new(gateway).with_idle_ttl(config.sessions.idle_ttl));
    spawn_session_sweeper(quote_service.clone(), config.sessions.idle_ttl);

    let app = with_quote_routes(quote_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        storage_configured,
        leads_table = %config.storage.leads_table,
        session_idle_ttl_secs = config.sessions.idle_ttl.as_secs(),
        "quote intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Sweep abandoned wizards between requests so an idle server still frees them.
fn spawn_session_sweeper(service: Arc<QuoteIntakeService>, idle_ttl: Duration) {
    let period = (idle_ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            service.evict_idle();
        }
    });
}
