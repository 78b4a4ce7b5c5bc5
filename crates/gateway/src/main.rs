//! PaperLens API Gateway
//!
//! HTTP surface of the document dashboard.
//! Handles:
//! - Project creation, selection and snapshots
//! - PDF uploads into the analysis queue
//! - Grounded chat, report generation and PDF export
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::Next,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use paperlens_common::{
    config::AppConfig,
    context::{DocumentAnalyzer, OutlierDetector, ReportWriter, Synthesizer},
    llm::{create_client, ModelClient},
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX, PROVIDER_BUCKETS},
    retry::RetryPolicy,
    store::{create_store, ProjectStore},
};
use paperlens_ingestion::{AnalysisQueue, QueueHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub queue: QueueHandle,
    pub synthesizer: Synthesizer,
    pub reports: ReportWriter,
    pub store: ProjectStore,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the adapters to one model client and start the analysis queue
    pub async fn new(
        config: Arc<AppConfig>,
        client: Arc<dyn ModelClient>,
        store: ProjectStore,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let extraction = &config.llm.extraction_model;
        let synthesis = &config.llm.synthesis_model;

        let queue = AnalysisQueue::start(
            store.clone(),
            DocumentAnalyzer::new(client.clone(), extraction, retry),
            OutlierDetector::new(client.clone(), synthesis, retry),
        )
        .await;

        Self {
            synthesizer: Synthesizer::new(client.clone(), synthesis, retry),
            reports: ReportWriter::new(client, synthesis, retry),
            config,
            queue,
            store,
            metrics,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    let config = Arc::new(config);

    init_tracing(&config);
    info!("Starting PaperLens API Gateway v{}", paperlens_common::VERSION);

    // Initialize metrics
    let prometheus = if config.observability.metrics_enabled {
        let handle = install_prometheus()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    info!(backend = %config.storage.backend, "Opening project store...");
    let store = create_store(&config.storage).await?;
    let client = create_client(&config.llm)?;
    info!(provider = %config.llm.provider, "Model client ready");

    let state = AppState::new(config.clone(), client, store, prometheus).await;
    let queue = state.queue.clone();

    // Build the router
    let app = create_router(state);

    // Start the server
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server host {}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = queue.shutdown().await {
        error!(error = %e, "Analysis queue did not shut down cleanly");
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_provider_duration_seconds", METRICS_PREFIX)),
            PROVIDER_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_analysis_duration_seconds", METRICS_PREFIX)),
            PROVIDER_BUCKETS,
        )?
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Routes that call the hosted model directly
    let mut provider_routes = Router::new()
        .route("/projects/{id}/chat", post(handlers::chat::ask))
        .route("/projects/{id}/report", post(handlers::report::generate))
        .route("/projects/{id}/report/pdf", post(handlers::report::export_pdf));

    if state.config.rate_limit.enabled {
        let limiter = create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        provider_routes = provider_routes.route_layer(axum::middleware::from_fn(
            move |req: Request, next: Next| rate_limit_middleware(req, next, limiter.clone()),
        ));
    }

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Project endpoints
        .route(
            "/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route("/projects/{id}", get(handlers::projects::get_project))
        .route("/projects/{id}/select", post(handlers::projects::select_project))
        // Upload endpoint
        .route(
            "/projects/{id}/files",
            post(handlers::files::upload_files)
                .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes)),
        )
        // Preferences
        .route(
            "/preferences/theme",
            get(handlers::preferences::get_theme).put(handlers::preferences::set_theme),
        )
        .merge(provider_routes)
        .route("/metrics", get(handlers::metrics::render));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
