//! vertigate - A safe, read-only HTTP gateway for Vertica analytical databases
//!
//! Entry point: resolves configuration, wires the composition root, runs a
//! startup connectivity check, and serves the HTTP API. The service starts in
//! a degraded-but-diagnosable mode when the database is unreachable or still
//! configured with placeholder credentials.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vertigate::config::{Settings, SharedSettings};
use vertigate::db::VerticaConnector;
use vertigate::server::runtime::{
    allow_loopback_listen, is_bindable_listen_host, resolve_listen_host, resolve_listen_port,
};
use vertigate::server::{AppState, router};

/// Run the vertigate HTTP server
#[derive(Debug, Parser)]
#[command(name = "vertigate", version, about)]
struct Cli {
    /// Bind address for the HTTP transport. Defaults to environment-driven
    /// resolution (0.0.0.0 when unset).
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP transport. Defaults to environment-driven
    /// resolution (8000 when unset).
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding the SQL template files.
    #[arg(long, default_value = "sql")]
    sql_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    let cli = Cli::parse();

    let settings =
        SharedSettings::new(Settings::load().context("configuration validation failed")?);

    let env = |key: &str| std::env::var(key).ok();
    let host = resolve_host_override(cli.host.as_deref(), &env);
    let port = resolve_port_override(cli.port, &env)?;

    let state = AppState::new(VerticaConnector, settings.clone(), cli.sql_dir);
    startup_validation(&state).await;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("could not bind {host}:{port}"))?;
    tracing::info!("vertigate listening on {host}:{port}");

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

fn resolve_host_override<F: Fn(&str) -> Option<String>>(host: Option<&str>, env: &F) -> String {
    let resolved = resolve_listen_host(env);
    let Some(host) = host else {
        return resolved;
    };

    let candidate = host.trim();
    if candidate.is_empty() {
        tracing::warn!("Ignoring empty --host override; using {resolved}");
        return resolved;
    }

    let allow_loopback = allow_loopback_listen(env);
    if is_bindable_listen_host(candidate, allow_loopback) {
        return candidate.to_string();
    }

    tracing::warn!("Ignoring --host override {host:?}; not a bindable interface.");
    if matches!(candidate, "127.0.0.1" | "localhost") && !allow_loopback {
        tracing::warn!(
            "Set ALLOW_LOOPBACK_LISTEN=1 to bind vertigate to loopback interfaces explicitly."
        );
    }
    resolved
}

fn resolve_port_override<F: Fn(&str) -> Option<String>>(
    port: Option<u16>,
    env: &F,
) -> Result<u16> {
    match port {
        None => Ok(resolve_listen_port(env)),
        Some(0) => bail!("Port 0 is outside the valid TCP port range (1-65535)."),
        Some(port) => Ok(port),
    }
}

/// Log the connection target and probe it once, continuing in degraded mode
/// on failure.
async fn startup_validation(state: &AppState<VerticaConnector>) {
    let (host, port, database, user, placeholder) = state.settings.read(|s| {
        (
            s.host.clone(),
            s.port,
            s.database.clone(),
            s.user.clone(),
            s.using_placeholder_credentials(),
        )
    });
    tracing::info!("Starting vertigate targeting {host}:{port}/{database} as {user}");

    if placeholder {
        tracing::error!(
            "Database credentials are still set to repository placeholder values; \
             update your environment before deployment."
        );
    }

    let check = vertigate::server::routes::database_check(state).await;
    if check.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
        let latency = check.get("latency_ms").and_then(serde_json::Value::as_f64);
        tracing::info!(
            "Initial database connectivity check succeeded in {:.1}ms",
            latency.unwrap_or(0.0)
        );
    } else {
        let error = check
            .get("error")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        tracing::warn!(
            "Initial database connectivity check failed: {error} -- continuing in degraded mode"
        );
    }
}
