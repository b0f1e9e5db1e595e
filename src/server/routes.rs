//! HTTP handlers
//!
//! Thin glue over the core: every handler validates input, calls into the
//! executor/pool/settings, and maps typed errors onto HTTP statuses.
//! Template and schema violations are client errors, timeouts and driver
//! failures are server errors, and connection-setup failures surface as
//! service-unavailable.

use crate::config::DatabaseOverrides;
use crate::db::connector::{Connector, SqlClient};
use crate::error::{ConfigError, QueryError};
use crate::redact::redact;
use crate::server::AppState;
use crate::server::runtime::{allow_loopback_listen, resolve_listen_host, resolve_listen_port};
use crate::sql::{Params, ranked_multi};
use crate::util::utc_now_iso;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};

/// Error wrapper that renders as a JSON problem body
pub enum ApiError {
    Query(QueryError),
    Config(ConfigError),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Config(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Query(err) => match err {
                QueryError::TemplateNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                QueryError::SchemaNotAllowed(_)
                | QueryError::InvalidIdentifier(_)
                | QueryError::MissingParameter(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                QueryError::Connect(_) => {
                    tracing::error!("connection failure behind query endpoint: {err}");
                    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
                }
                QueryError::Timeout { .. } | QueryError::Driver(_) => {
                    tracing::error!("query execution failed: {err}");
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
            ApiError::Config(err) => match err {
                ConfigError::InvalidOverride(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                _ => {
                    tracing::error!("configuration operation failed: {err}");
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
        };

        let body = Json(json!({
            "error": redact(&message),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

/// Basic landing endpoint for quick smoke tests.
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "vertigate",
        "health": "/healthz",
        "documentation": "https://github.com/vertigate/vertigate",
    }))
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    #[serde(default, rename = "ping-database")]
    pub ping_database: bool,
}

/// Health document; 503 when any check fails.
pub async fn healthz<C: Connector>(
    State(state): State<AppState<C>>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let payload = health_response(&state, query.ping_database).await;
    let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(payload)).into_response()
}

/// Liveness endpoint. Database checks run in skip mode so probes stay
/// lightweight.
pub async fn status<C: Connector>(State(state): State<AppState<C>>) -> Json<Value> {
    Json(health_response(&state, false).await)
}

pub async fn diagnostics<C: Connector>(State(state): State<AppState<C>>) -> Json<Value> {
    Json(json!({
        "runtime": runtime_diagnostics(),
        "config": config_diagnostics(&state),
        "recent_errors": state.errors.recent(None),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RawQueryRequest {
    pub query: String,
}

/// Raw single-statement endpoint. SELECT-only, row-capped, redacted errors;
/// failures come back as `ok: false` payloads rather than HTTP errors.
pub async fn raw_query<C: Connector>(
    State(state): State<AppState<C>>,
    Json(request): Json<RawQueryRequest>,
) -> Json<Value> {
    Json(raw_query_execution(&state, &request.query).await)
}

#[derive(Debug, Deserialize)]
pub struct RunTemplateRequest {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Run a named SQL template through the safe executor.
pub async fn run_template<C: Connector>(
    State(state): State<AppState<C>>,
    Path(template): Path<String>,
    Json(request): Json<RunTemplateRequest>,
) -> Result<Json<Value>, ApiError> {
    let (rows, provenance) = state
        .executor
        .run(&template, request.params, request.limit)
        .await?;
    Ok(Json(json!({
        "rows": rows,
        "provenance": provenance,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RankQuery {
    pub template: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Deserialize)]
pub struct RankRequest {
    pub queries: Vec<RankQuery>,
    #[serde(default = "default_rank_k")]
    pub k: u64,
}

fn default_rank_k() -> u64 {
    50
}

/// Merge several templated queries into one ranked list.
pub async fn rank<C: Connector>(
    State(state): State<AppState<C>>,
    Json(request): Json<RankRequest>,
) -> Result<Json<Value>, ApiError> {
    let queries: Vec<(String, Params)> = request
        .queries
        .into_iter()
        .map(|q| (q.template, q.params))
        .collect();

    let (ranked, provenances) = ranked_multi(state.executor.as_ref(), &queries, request.k).await?;

    let results: Vec<Value> = ranked
        .into_iter()
        .map(|(key, score)| json!({"key": key, "score": score}))
        .collect();
    Ok(Json(json!({
        "results": results,
        "provenance": provenances,
    })))
}

/// Replace the database connection target at runtime. The pool is rebuilt so
/// the next borrower connects to the new target.
pub async fn admin_database<C: Connector>(
    State(state): State<AppState<C>>,
    Json(overrides): Json<DatabaseOverrides>,
) -> Result<Json<Value>, ApiError> {
    state.settings.apply_database_overrides(overrides)?;
    state.pool.reset();
    tracing::info!("database connection target replaced via admin API");
    Ok(Json(json!({
        "ok": true,
        "config": config_diagnostics(&state),
    })))
}

/// Restore the environment-derived configuration and rebuild the pool.
pub async fn admin_database_reload<C: Connector>(
    State(state): State<AppState<C>>,
) -> Result<Json<Value>, ApiError> {
    state.settings.reload_from_environment()?;
    state.pool.reset();
    tracing::info!("configuration reloaded from environment via admin API");
    Ok(Json(json!({
        "ok": true,
        "config": config_diagnostics(&state),
    })))
}

pub async fn admin_pool<C: Connector>(State(state): State<AppState<C>>) -> Json<Value> {
    Json(json!({
        "pool": state.pool.pool_details(),
        "retry": state.pool.retry_state(),
    }))
}

pub async fn admin_pool_reset<C: Connector>(State(state): State<AppState<C>>) -> Json<Value> {
    state.pool.reset();
    Json(json!({
        "ok": true,
        "pool": state.pool.pool_details(),
    }))
}

/// Full health document shared by `/healthz` and `/status`.
pub async fn health_response<C: Connector>(state: &AppState<C>, ping: bool) -> Value {
    let database = if ping {
        database_check(state).await
    } else {
        json!({
            "ok": true,
            "skipped": true,
            "message": "Set ping-database=true to run a live Vertica query",
        })
    };

    let ok = database.get("ok").and_then(Value::as_bool).unwrap_or(false);
    let env = |key: &str| std::env::var(key).ok();

    json!({
        "ok": ok,
        "timestamp": utc_now_iso(),
        "checks": { "database": database },
        "diagnostics": {
            "runtime": runtime_diagnostics(),
            "config": config_diagnostics(state),
        },
        "status": {
            "runtime": {
                "listen": {
                    "host": resolve_listen_host(&env),
                    "port": resolve_listen_port(&env),
                    "loopback_allowed": allow_loopback_listen(&env),
                },
            },
        },
    })
}

/// Live database probe: degraded on placeholder credentials, otherwise a
/// pooled `SELECT 1` under the query timeout.
pub async fn database_check<C: Connector>(state: &AppState<C>) -> Value {
    let pool_info = state.pool.pool_details();
    let retry = state.pool.retry_state();
    let (target, placeholder, timeout_s) = state.settings.read(|s| {
        (
            json!({
                "host": s.host,
                "port": s.port,
                "database": s.database,
                "user": s.user,
            }),
            s.using_placeholder_credentials(),
            s.query_timeout_s,
        )
    });

    if placeholder {
        return json!({
            "ok": false,
            "pool": pool_info,
            "retry": retry,
            "target": target,
            "error": "Database credentials are using repository placeholder values.",
            "placeholder_credentials": true,
        });
    }

    let started = Instant::now();
    let outcome: Result<(), (String, &'static str)> = async {
        let conn = state
            .pool
            .acquire()
            .await
            .map_err(|e| (redact(&e.to_string()), e.kind_name()))?;
        match tokio::time::timeout(Duration::from_secs(timeout_s), conn.fetch("SELECT 1")).await {
            Err(_elapsed) => {
                conn.discard();
                Err((format!("health probe timed out after {timeout_s}s"), "QueryTimeout"))
            }
            Ok(Err(driver)) => {
                conn.discard();
                Err((redact(&driver.0), "DriverError"))
            }
            Ok(Ok(_rows)) => Ok(()),
        }
    }
    .await;

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    match outcome {
        Ok(()) => json!({
            "ok": true,
            "latency_ms": latency_ms,
            "pool": pool_info,
            "retry": retry,
            "target": target,
        }),
        Err((error, exception)) => {
            state.errors.record("health.database", &error, Some(exception));
            json!({
                "ok": false,
                "latency_ms": latency_ms,
                "pool": pool_info,
                "retry": state.pool.retry_state(),
                "target": target,
                "error": error,
                "exception": exception,
            })
        }
    }
}

/// Guarded raw execution used by the `/query` endpoint and startup checks.
pub(crate) async fn raw_query_execution<C: Connector>(state: &AppState<C>, query: &str) -> Value {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return json!({"ok": false, "error": "Query must not be empty"});
    }
    if !trimmed.to_uppercase().starts_with("SELECT ") {
        return json!({"ok": false, "error": "Only SELECT statements are allowed"});
    }

    let (max_rows, timeout_s) = state.settings.read(|s| (s.max_rows, s.query_timeout_s));
    let body = trimmed.trim_end_matches(';').trim_end();
    let capped = format!("SELECT * FROM ( {body} ) AS t LIMIT {max_rows}");

    let started = Instant::now();
    let result: Result<Vec<crate::db::SqlRow>, (String, &'static str)> = async {
        let conn = state
            .pool
            .acquire()
            .await
            .map_err(|e| (redact(&e.to_string()), e.kind_name()))?;
        match tokio::time::timeout(Duration::from_secs(timeout_s), conn.fetch(&capped)).await {
            Err(_elapsed) => {
                conn.discard();
                Err((format!("query timed out after {timeout_s}s"), "QueryTimeout"))
            }
            Ok(Err(driver)) => {
                conn.discard();
                Err((redact(&driver.0), "DriverError"))
            }
            Ok(Ok(rows)) => Ok(rows),
        }
    }
    .await;

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(rows) => json!({
            "ok": true,
            "latency_ms": latency_ms,
            "row_count": rows.len(),
            "rows": rows,
        }),
        Err((error, exception)) => {
            state.errors.record("query.raw", &error, Some(exception));
            json!({
                "ok": false,
                "latency_ms": latency_ms,
                "error": error,
                "exception": exception,
            })
        }
    }
}

pub(crate) fn runtime_diagnostics() -> Value {
    json!({
        "service": "vertigate",
        "version": env!("CARGO_PKG_VERSION"),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "pid": std::process::id(),
    })
}

pub(crate) fn config_diagnostics<C: Connector>(state: &AppState<C>) -> Value {
    state.settings.read(|s| {
        json!({
            "database": {
                "host": s.host,
                "port": s.port,
                "database": s.database,
                "user": s.user,
                "placeholder_credentials": s.using_placeholder_credentials(),
                "source": s.database_source(),
            },
            "pool": { "size": s.pool_size },
            "query": {
                "timeout_s": s.query_timeout_s,
                "max_rows": s.max_rows,
            },
            "schemas": s.allowed_schemas,
            "auth": { "http_token_configured": s.http_token.is_some() },
            "cors": s.cors_origins,
        })
    })
}
