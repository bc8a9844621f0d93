use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;

use apply_pilot::config::AppConfig;
use apply_pilot::error::AppError;
use apply_pilot::pipeline::{
    ApplyQueue, BatchProcessor, PipelineError, PolicyConfig,
};
use apply_pilot::pipeline::memory::{
    InMemoryApplicationRepository, InMemoryApplyQueue, InMemoryAuditLog, InMemoryFactStore,
};
use apply_pilot::telemetry;

use crate::cli::ServeArgs;
use crate::infra::{demo_bullet_bank, demo_jobs, demo_profile, AppState};
use crate::portal::PortalClient;
use crate::routes::with_pipeline_routes;

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

    let queue = Arc::new(InMemoryApplyQueue::default());
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let audit = Arc::new(InMemoryAuditLog::default());
    let facts = Arc::new(InMemoryFactStore::default());
    if args.seed {
        facts.set_profile(demo_profile());
        facts.set_bullets(demo_bullet_bank());
        let seeded = queue.enqueue(demo_jobs()).map_err(PipelineError::Queue)?;
        info!(seeded, "demo data loaded into the apply queue");
    }

    let sink = Arc::new(PortalClient::new(&config.portal)?);
    let processor = Arc::new(BatchProcessor::new(
        queue,
        repository,
        sink,
        facts,
        audit,
        PolicyConfig::default(),
        config.batch.clone(),
    ));

    let app = with_pipeline_routes(processor)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "application pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
