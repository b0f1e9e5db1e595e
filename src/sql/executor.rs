//! Safe query execution
//!
//! Every templated statement goes through the same gauntlet: schema
//! allowlisting (textual scan plus parameter validation), row-cap injection,
//! and a hard wall-clock timeout on the execute+fetch call. Each execution
//! produces a [`Provenance`] record for audit display.

use crate::config::SharedSettings;
use crate::db::connector::{Connector, SqlClient};
use crate::db::pool::ConnectionPool;
use crate::db::types::SqlRow;
use crate::error::{QueryError, QueryResult};
use crate::redact::redact;
use crate::sql::template::{self, ParamValue, Params};
use crate::util::utc_now_iso;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Audit record of one executed query
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    /// Template file name
    pub sql_or_view: String,
    /// The exact parameter map bound at execution, after limit injection
    pub params: Params,
    /// UTC ISO-8601 timestamp of execution start
    pub as_of_ts: String,
    pub row_count: usize,
    pub duration_ms: f64,
}

/// Executes named SQL templates through the pool under the access policy
pub struct QueryExecutor<C: Connector> {
    settings: SharedSettings,
    pool: Arc<ConnectionPool<C>>,
    sql_dir: PathBuf,
}

impl<C: Connector> QueryExecutor<C> {
    pub fn new(settings: SharedSettings, pool: Arc<ConnectionPool<C>>, sql_dir: PathBuf) -> Self {
        Self {
            settings,
            pool,
            sql_dir,
        }
    }

    /// Validate that `schema` is a bare identifier on the allowlist.
    pub fn ensure_schema_allowed(&self, schema: &str) -> QueryResult<()> {
        let allowed = self.settings.read(|s| s.allowed_schema_set());
        ensure_schema_allowed(schema, &allowed)
    }

    /// Run a named template with bound parameters.
    ///
    /// `limit` requests a row cap; the global `max_rows` always wins even if
    /// the caller asks for more. Returns the fetched rows and the provenance
    /// of the execution.
    pub async fn run(
        &self,
        template_name: &str,
        params: Params,
        limit: Option<u64>,
    ) -> QueryResult<(Vec<SqlRow>, Provenance)> {
        let sql = template::load(&self.sql_dir, template_name)?;

        let (max_rows, timeout_s, allowed) = self
            .settings
            .read(|s| (s.max_rows, s.query_timeout_s, s.allowed_schema_set()));

        enforce_schema_allowlist(&sql, &allowed)?;

        let mut params = params;
        for (key, value) in &params {
            if key.ends_with("schema") {
                let schema = value
                    .as_str()
                    .ok_or_else(|| QueryError::InvalidIdentifier(key.clone()))?;
                ensure_schema_allowed(schema, &allowed)?;
            }
        }

        // The global cap always wins, even against a larger caller request.
        let cap = limit.unwrap_or(max_rows).min(max_rows);
        let sql = if template::placeholder_names(&sql).contains("limit") {
            sql
        } else {
            template::wrap_with_limit(&sql)
        };
        params.insert(
            "limit".to_string(),
            ParamValue::Int(cap.min(i64::MAX as u64) as i64),
        );

        let final_sql = template::render(&sql, &params)?;

        let as_of_ts = utc_now_iso();
        let started = Instant::now();
        let conn = self.pool.acquire().await?;

        let fetched = tokio::time::timeout(Duration::from_secs(timeout_s), conn.fetch(&final_sql))
            .await;

        let rows = match fetched {
            Err(_elapsed) => {
                // The in-flight call may not be cancellable server-side, so
                // the connection is closed rather than pooled.
                conn.discard();
                return Err(QueryError::Timeout { seconds: timeout_s });
            }
            Ok(Err(driver)) => {
                // Session health is unknown after any execution failure.
                conn.discard();
                return Err(QueryError::Driver(redact(&driver.0)));
            }
            Ok(Ok(rows)) => {
                drop(conn);
                rows
            }
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let provenance = Provenance {
            sql_or_view: template_name.to_string(),
            params,
            as_of_ts,
            row_count: rows.len(),
            duration_ms,
        };

        Ok((rows, provenance))
    }
}

fn ensure_schema_allowed(schema: &str, allowed: &HashSet<String>) -> QueryResult<()> {
    if !template::is_identifier(schema) {
        return Err(QueryError::InvalidIdentifier(schema.to_string()));
    }
    if !allowed.contains(&schema.to_lowercase()) {
        return Err(QueryError::SchemaNotAllowed(vec![schema.to_string()]));
    }
    Ok(())
}

/// Reject statements whose textual schema qualifiers leave the allowlist.
fn enforce_schema_allowlist(sql: &str, allowed: &HashSet<String>) -> QueryResult<()> {
    let mut disallowed: Vec<String> = template::schema_qualifiers(sql)
        .into_iter()
        .filter(|schema| !allowed.contains(&schema.to_lowercase()))
        .collect();
    if !disallowed.is_empty() {
        disallowed.sort();
        return Err(QueryError::SchemaNotAllowed(disallowed));
    }
    Ok(())
}
