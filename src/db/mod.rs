//! Database connectivity
//!
//! This module provides a trait-based abstraction over connection
//! establishment and statement execution, a bounded connection pool with
//! classified-failure retry, and the observable retry state surfaced by the
//! health endpoints.

pub mod connector;
pub mod pool;
pub mod retry;
pub mod types;
pub mod vertica;

// Re-export main types
pub use connector::{Connector, DriverFailure, SqlClient};
pub use pool::{ConnectionPool, PoolDetails, PooledConn};
pub use retry::RetryState;
pub use types::{CellValue, SqlRow};
pub use vertica::VerticaConnector;

/// The production pool type: Vertica over the PostgreSQL wire protocol.
pub type VerticaPool = ConnectionPool<VerticaConnector>;
