//! HTTP surface of the gateway
//!
//! A thin axum layer over the core: health and diagnostics documents, the
//! templated-query and rank endpoints, and the admin operations that swap the
//! connection target at runtime. When `HTTP_TOKEN` is configured every route
//! except the landing page, `/healthz`, and `/status` requires a bearer
//! token.

pub mod errlog;
pub mod routes;
pub mod runtime;

pub use errlog::ErrorHistory;

use crate::config::SharedSettings;
use crate::db::connector::Connector;
use crate::db::pool::ConnectionPool;
use crate::sql::QueryExecutor;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state handed to every handler
pub struct AppState<C: Connector> {
    pub settings: SharedSettings,
    pub pool: Arc<ConnectionPool<C>>,
    pub executor: Arc<QueryExecutor<C>>,
    pub errors: Arc<ErrorHistory>,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            pool: Arc::clone(&self.pool),
            executor: Arc::clone(&self.executor),
            errors: Arc::clone(&self.errors),
        }
    }
}

impl<C: Connector> AppState<C> {
    /// Wire up the composition root: one pool, one executor, one error ring.
    pub fn new(connector: C, settings: SharedSettings, sql_dir: PathBuf) -> Self {
        let pool = Arc::new(ConnectionPool::new(connector, settings.clone()));
        let executor = Arc::new(QueryExecutor::new(
            settings.clone(),
            Arc::clone(&pool),
            sql_dir,
        ));
        Self {
            settings,
            pool,
            executor,
            errors: Arc::new(ErrorHistory::from_env()),
        }
    }
}

/// Build the full route tree with auth, CORS, and request tracing attached.
pub fn router<C: Connector>(state: AppState<C>) -> Router {
    let cors = cors_layer(state.settings.read(|s| s.cors_origins.clone()).as_deref());

    Router::new()
        .route("/", get(routes::root))
        .route("/healthz", get(routes::healthz::<C>))
        .route("/status", get(routes::status::<C>))
        .route("/diagnostics", get(routes::diagnostics::<C>))
        .route("/query", post(routes::raw_query::<C>))
        .route("/sql/{template}", post(routes::run_template::<C>))
        .route("/rank", post(routes::rank::<C>))
        .route("/admin/database", post(routes::admin_database::<C>))
        .route(
            "/admin/database/reload",
            post(routes::admin_database_reload::<C>),
        )
        .route("/admin/pool", get(routes::admin_pool::<C>))
        .route("/admin/pool/reset", post(routes::admin_pool_reset::<C>))
        .layer(middleware::from_fn_with_state(state.clone(), bearer::<C>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Paths that stay reachable without a token, so health probes and smoke
/// tests keep working on a locked-down deployment.
const PUBLIC_PATHS: [&str; 3] = ["/", "/healthz", "/status"];

fn bearer_authorized(token: Option<&str>, path: &str, authorization: Option<&str>) -> bool {
    let Some(token) = token else {
        return true;
    };
    if PUBLIC_PATHS.contains(&path) {
        return true;
    }
    match authorization {
        Some(header) => header == format!("Bearer {token}"),
        None => false,
    }
}

async fn bearer<C: Connector>(
    State(state): State<AppState<C>>,
    request: Request,
    next: Next,
) -> Response {
    let token = state.settings.read(|s| s.http_token.clone());
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !bearer_authorized(token.as_deref(), request.uri().path(), authorization.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized", "status": 401})),
        )
            .into_response();
    }

    next.run(request).await
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        None => CorsLayer::new(),
        Some("*") => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(list) => {
            let parsed: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}
