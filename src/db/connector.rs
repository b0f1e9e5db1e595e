//! Connection and statement-execution traits
//!
//! The pool and executor are generic over these seams so tests can run with
//! mock implementations and no live database. The production implementation
//! lives in [`crate::db::vertica`].

use crate::config::ConnectOptions;
use crate::db::types::SqlRow;
use crate::error::ConnectResult;
use async_trait::async_trait;

/// Driver-level failure while executing a statement.
///
/// Carries raw driver text; callers are responsible for passing it through
/// credential redaction before logging or surfacing it.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DriverFailure(pub String);

/// An established database session.
///
/// A connection is owned by exactly one borrower at a time; the pool never
/// hands the same session to two callers.
#[async_trait]
pub trait SqlClient: Send + Sync + 'static {
    /// Execute a single statement and fetch every row.
    async fn fetch(&self, sql: &str) -> Result<Vec<SqlRow>, DriverFailure>;
}

/// Opens physical connections from a connection-target description.
///
/// Establishing a connection is a blocking, potentially multi-second
/// operation; implementations must not assume any pool lock is held.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: SqlClient;

    /// Open one new physical connection, classifying failures.
    async fn connect(&self, options: &ConnectOptions) -> ConnectResult<Self::Conn>;
}
