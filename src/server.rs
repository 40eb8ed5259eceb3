//! # Server Configuration
//!
//! Router construction and the `serve` lifecycle: HTTP listener plus the
//! background scheduler, both stopped by one cancellation token.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispatch::CampaignDispatcher;
use crate::gateway::MessageGateway;
use crate::handlers;
use crate::scheduler::CampaignScheduler;
use crate::telemetry::{self, TraceContext};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub dispatcher: CampaignDispatcher,
    pub scheduler: CampaignScheduler,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        gateway: Arc<dyn MessageGateway>,
    ) -> Self {
        let dispatcher = CampaignDispatcher::new(db.clone(), gateway, config.dispatch.clone());
        let scheduler = CampaignScheduler::new(config.scheduler.clone(), dispatcher.clone());
        Self {
            config,
            db,
            dispatcher,
            scheduler,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/campaigns/{id}/send-message",
            post(handlers::campaigns::send_message),
        )
        .route("/campaigns/run-due", post(handlers::campaigns::run_due))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(request_trace_context))
        .layer(TraceLayer::new_for_http())
}

/// Propagate `x-request-id` (or a fresh id) into the task-local trace context
/// so error bodies carry it, and echo it on the response.
async fn request_trace_context(request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = telemetry::with_trace_context(
        TraceContext {
            trace_id: trace_id.clone(),
        },
        next.run(request),
    )
    .await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Serve HTTP until `shutdown` fires, running the scheduler alongside when enabled.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .context("Invalid server address")?;

    let scheduler_handle = if state.config.scheduler.enabled {
        let scheduler = state.scheduler.clone();
        let token = shutdown.child_token();
        Some(tokio::spawn(async move { scheduler.run(token).await }))
    } else {
        tracing::info!("Campaign scheduler disabled by configuration");
        None
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, profile = %state.config.profile, "Server listening");

    let app = create_app(state);
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    if let Some(handle) = scheduler_handle
        && let Err(err) = handle.await
    {
        tracing::error!(error = %err, "Scheduler task terminated abnormally");
    }

    serve_result.context("HTTP server error")
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::campaigns::send_message,
        crate::handlers::campaigns::run_due,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::CampaignStatus,
            crate::handlers::HealthStatus,
            crate::handlers::campaigns::SendMessageRequest,
            crate::dispatch::DispatchReport,
            crate::scheduler::TickReport,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service information"),
        (name = "campaigns", description = "Campaign dispatch")
    ),
    info(
        title = "Campaign Dispatcher API",
        description = "Scheduled and manual dispatch of messaging campaigns",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
