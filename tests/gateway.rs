//! End-to-end tests for the pool + executor stack
//!
//! These run against a scripted connector, so no live database is required.
//! The production wire driver is exercised separately against a real cluster.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use vertigate::config::{ConnectOptions, Settings, SharedSettings};
use vertigate::db::{CellValue, ConnectionPool, Connector, DriverFailure, SqlClient, SqlRow};
use vertigate::error::{ConnectError, ConnectResult, QueryError};
use vertigate::sql::{ParamValue, Params, QueryExecutor, ranked_multi};

/// Connector double: optionally fails the first N connection attempts, then
/// hands out sessions that answer scripted results per SQL marker.
struct TestConnector {
    attempts: AtomicUsize,
    fail_first: usize,
    routes: Arc<Vec<(&'static str, Vec<SqlRow>)>>,
}

struct TestConn {
    routes: Arc<Vec<(&'static str, Vec<SqlRow>)>>,
}

#[async_trait]
impl SqlClient for TestConn {
    async fn fetch(&self, sql: &str) -> Result<Vec<SqlRow>, DriverFailure> {
        for (marker, rows) in self.routes.iter() {
            if sql.contains(marker) {
                return Ok(rows.clone());
            }
        }
        Err(DriverFailure(format!("no scripted result for: {sql}")))
    }
}

#[async_trait]
impl Connector for TestConnector {
    type Conn = TestConn;

    async fn connect(&self, options: &ConnectOptions) -> ConnectResult<TestConn> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(ConnectError::ConnectionRefused {
                host: options.host.clone(),
                port: options.port,
                detail: "scripted refusal".to_string(),
            });
        }
        Ok(TestConn {
            routes: Arc::clone(&self.routes),
        })
    }
}

struct Fixture {
    _dir: TempDir,
    settings: SharedSettings,
    pool: Arc<ConnectionPool<TestConnector>>,
    executor: QueryExecutor<TestConnector>,
}

fn fixture(
    env: &[(&str, &str)],
    fail_first: usize,
    routes: Vec<(&'static str, Vec<SqlRow>)>,
    templates: &[(&str, &str)],
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in templates {
        std::fs::write(dir.path().join(name), body).unwrap();
    }

    let map: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let settings =
        SharedSettings::new(Settings::load_from(move |key| map.get(key).cloned()).unwrap());

    let connector = TestConnector {
        attempts: AtomicUsize::new(0),
        fail_first,
        routes: Arc::new(routes),
    };
    let pool = Arc::new(ConnectionPool::new(connector, settings.clone()));
    let executor = QueryExecutor::new(settings.clone(), Arc::clone(&pool), dir.path().to_path_buf());

    Fixture {
        _dir: dir,
        settings,
        pool,
        executor,
    }
}

fn scored(key: &str, score: f64) -> SqlRow {
    SqlRow::new(vec![
        CellValue::Text(key.to_string()),
        CellValue::Float(score),
    ])
}

#[tokio::test]
async fn run_sql_applies_cap_and_returns_provenance() {
    let fx = fixture(
        &[("MAX_ROWS", "10")],
        0,
        vec![("probe_src", vec![scored("row", 1.0)])],
        &[("probe.sql", "SELECT name, score FROM probe_src LIMIT :limit")],
    );

    let (rows, provenance) = fx
        .executor
        .run("probe.sql", Params::new(), Some(99))
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(provenance.sql_or_view, "probe.sql");
    assert_eq!(provenance.row_count, 1);
    assert_eq!(provenance.params.get("limit"), Some(&ParamValue::Int(10)));
    assert!(provenance.as_of_ts.ends_with('Z'));

    // The borrowed connection went back to the cache.
    assert_eq!(fx.pool.pool_details().available, 1);
}

#[tokio::test]
async fn schema_allowlist_blocks_template_references() {
    let fx = fixture(
        &[("ALLOWED_SCHEMAS", "public")],
        0,
        vec![],
        &[("leak.sql", "SELECT * FROM secret.events LIMIT :limit")],
    );

    let err = fx
        .executor
        .run("leak.sql", Params::new(), None)
        .await
        .unwrap_err();
    match err {
        QueryError::SchemaNotAllowed(schemas) => assert_eq!(schemas, vec!["secret".to_string()]),
        other => panic!("expected SchemaNotAllowed, got {other:?}"),
    }
}

#[tokio::test]
async fn rank_merges_across_templates() {
    let fx = fixture(
        &[],
        0,
        vec![
            ("one_src", vec![scored("alpha", 1.0), scored("beta", 0.5)]),
            ("two_src", vec![scored("beta", 0.9), scored("gamma", 0.2)]),
        ],
        &[
            ("one.sql", "SELECT name, score FROM one_src LIMIT :limit"),
            ("two.sql", "SELECT name, score FROM two_src LIMIT :limit"),
        ],
    );

    let queries = vec![
        ("one.sql".to_string(), Params::new()),
        ("two.sql".to_string(), Params::new()),
    ];
    let (ranked, provenances) = ranked_multi(&fx.executor, &queries, 5).await.unwrap();

    assert_eq!(ranked, vec![
        ("alpha".to_string(), 1.0),
        ("beta".to_string(), 0.9),
        ("gamma".to_string(), 0.2)
    ]);
    assert_eq!(provenances.len(), 2);
    assert!(
        provenances
            .iter()
            .all(|p| p.params.get("limit") == Some(&ParamValue::Int(5)))
    );
}

#[tokio::test(start_paused = true)]
async fn connect_retry_surfaces_classified_error_and_state() {
    let fx = fixture(
        &[
            ("DB_CONNECTION_RETRIES", "3"),
            ("DB_CONNECTION_RETRY_BACKOFF_S", "0.25"),
        ],
        usize::MAX,
        vec![],
        &[("probe.sql", "SELECT 1 LIMIT :limit")],
    );

    let err = fx
        .executor
        .run("probe.sql", Params::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Connect(ConnectError::ConnectionRefused { .. })
    ));

    let state = fx.pool.retry_state();
    assert_eq!(state.attempts, 3);
    assert!(state.exhausted);
    assert!(state.recovered_at.is_none());
}

#[tokio::test]
async fn connect_recovers_after_transient_failure() {
    let fx = fixture(
        &[("DB_CONNECTION_RETRY_BACKOFF_S", "0")],
        1,
        vec![("probe_src", vec![scored("row", 1.0)])],
        &[("probe.sql", "SELECT name, score FROM probe_src LIMIT :limit")],
    );

    let (rows, _) = fx
        .executor
        .run("probe.sql", Params::new(), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let state = fx.pool.retry_state();
    assert!(state.recovered_at.is_some());
    assert!(!state.exhausted);
}

#[tokio::test]
async fn driver_error_is_redacted_and_connection_discarded() {
    let fx = fixture(
        &[],
        0,
        // No route matches, so fetch fails with text echoing a "dsn".
        vec![],
        &[(
            "boom.sql",
            "SELECT 1 /* password=hunter2 */ LIMIT :limit",
        )],
    );

    let err = fx
        .executor
        .run("boom.sql", Params::new(), None)
        .await
        .unwrap_err();
    match err {
        QueryError::Driver(message) => {
            assert!(!message.contains("hunter2"), "driver text must be redacted");
        }
        other => panic!("expected Driver error, got {other:?}"),
    }
    assert_eq!(fx.pool.pool_details().available, 0);
}

#[tokio::test]
async fn override_then_reload_round_trip_resets_pool_target() {
    let fx = fixture(
        &[("DB_HOST", "env-host"), ("POOL_SIZE", "2")],
        0,
        vec![("probe_src", vec![scored("row", 1.0)])],
        &[("probe.sql", "SELECT name, score FROM probe_src LIMIT :limit")],
    );

    // Warm the cache, then swap the target and reset as the admin API does.
    fx.executor
        .run("probe.sql", Params::new(), None)
        .await
        .unwrap();
    assert_eq!(fx.pool.pool_details().available, 1);

    fx.settings
        .apply_database_overrides(vertigate::config::DatabaseOverrides {
            host: "rt-host".to_string(),
            port: 5999,
            user: "rt".to_string(),
            password: "rt".to_string(),
            database: "rt".to_string(),
        })
        .unwrap();
    fx.pool.reset();
    assert_eq!(fx.pool.pool_details().available, 0);
    assert_eq!(fx.settings.snapshot().host, "rt-host");

    fx.settings
        .reload_from(|key| match key {
            "DB_HOST" => Some("env-host".to_string()),
            "POOL_SIZE" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
    fx.pool.reset();
    assert_eq!(fx.settings.snapshot().host, "env-host");
}
