use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_screening_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hire_ai::config::AppConfig;
use hire_ai::error::AppError;
use hire_ai::telemetry;
use hire_ai::workflows::screening::documents::FilesystemBlobStore;
use hire_ai::workflows::screening::{HttpScoringClient, MemoryStore, ScreeningServices};
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

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let blobs = FilesystemBlobStore::new(&config.screening.storage_dir);
    blobs.validate().await?;

    if config.scoring.api_key.is_none() {
        warn!(endpoint = %config.scoring.endpoint, "no scoring API key configured");
    }
    let scorer = HttpScoringClient::new(&config.scoring)?;

    let (store, _) = MemoryStore::open(&config.screening.state_path)?;

    let services = Arc::new(ScreeningServices::new(
        Arc::new(store),
        Arc::new(blobs),
        Arc::new(scorer),
        &config.screening,
        config.query,
    ));

    let app = with_screening_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        environment = ?config.environment,
        %addr,
        storage_dir = %config.screening.storage_dir.display(),
        state_path = %config.screening.state_path.display(),
        max_concurrency = config.screening.max_concurrency,
        "cv screening service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
