//! # Server Configuration
//!
//! Router assembly, shared state and the HTTP server lifecycle for showsync.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::activities::activity_registry;
use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::telemetry::trace_context_middleware;
use crate::upstream::CatalogSource;
use crate::workflow::WorkflowEngine;
use crate::workflows;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub engine: Arc<WorkflowEngine>,
}

impl AppState {
    /// Wires the engine with both ingestion workflows and the catalog activities.
    pub fn new(config: AppConfig, db: DatabaseConnection, source: Arc<dyn CatalogSource>) -> Self {
        let engine = WorkflowEngine::new(
            db.clone(),
            workflows::definitions(&config.workflow),
            activity_registry(source, db.clone()),
            &config.workflow,
        );
        Self {
            db,
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/ingest", post(handlers::runs::trigger_ingest))
        .route("/updates", post(handlers::runs::trigger_update))
        .route("/runs", get(handlers::runs::list_runs))
        .route("/runs/{id}/terminate", post(handlers::runs::terminate_run))
        .route("/admin/terminate-all", post(handlers::admin::terminate_all))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/runs/{id}", get(handlers::runs::get_run))
        .merge(operator_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until `shutdown` is cancelled
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::runs::trigger_ingest,
        crate::handlers::runs::trigger_update,
        crate::handlers::runs::get_run,
        crate::handlers::runs::list_runs,
        crate::handlers::runs::terminate_run,
        crate::handlers::admin::terminate_all,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::HealthStatus,
            crate::error::ApiError,
            crate::handlers::runs::RunHandle,
            crate::handlers::runs::IngestRequest,
            crate::handlers::runs::RunsResponse,
            crate::handlers::runs::TerminateRequest,
            crate::handlers::runs::TerminateResponse,
            crate::workflow::RunSnapshot,
            crate::workflow::RunStatus,
            crate::workflow::TerminateAllReport,
            crate::workflow::TerminateFailure,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "showsync API",
        description = "Trigger, monitor and terminate TV catalog ingestion runs",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
