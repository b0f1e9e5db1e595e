//! vertigate - A safe, read-only HTTP gateway for Vertica analytical databases
//!
//! vertigate exposes a fixed set of parametrized SQL operations over HTTP
//! while shielding the database from unsafe access patterns: arbitrary
//! writes, unbounded result sets, disallowed schemas, runaway queries, and
//! connection exhaustion.
//!
//! # Features
//!
//! - **Bounded connection pool**: a small cache of live sessions with
//!   classified-failure retry and deterministic exponential backoff
//! - **Safe query execution**: schema allowlisting, row-cap injection, and a
//!   hard wall-clock timeout on every templated statement
//! - **Rank merging**: several templated queries folded into one ranked list
//! - **Runtime reconfiguration**: the connection target can be replaced and
//!   restored without a restart
//! - **Credential hygiene**: every surfaced error message is redacted before
//!   it reaches a log line or response body
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`]: environment-driven settings and runtime overrides
//! - [`db`]: connector trait, bounded pool, and retry state
//! - [`sql`]: template loading, the safe executor, and rank merging
//! - [`server`]: the HTTP boundary consuming the core
//! - [`error`]: error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use vertigate::config::{Settings, SharedSettings};
//! use vertigate::db::{ConnectionPool, VerticaConnector};
//! use vertigate::sql::{Params, QueryExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SharedSettings::new(Settings::load()?);
//! let pool = Arc::new(ConnectionPool::new(VerticaConnector, settings.clone()));
//! let executor = QueryExecutor::new(settings, pool, PathBuf::from("sql"));
//!
//! let (rows, provenance) = executor
//!     .run("search_tables_by_name.sql", Params::new(), Some(25))
//!     .await?;
//! println!("{} rows via {}", rows.len(), provenance.sql_or_view);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod redact;
pub mod server;
pub mod sql;
pub mod util;

pub use error::{ConfigError, ConnectError, GatewayError, QueryError, Result};
