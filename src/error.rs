//! Error types for vertigate
//!
//! This module defines the error hierarchy used throughout the gateway.
//! We use `thiserror` for library-style errors with clear error chains.
//!
//! The split matters to callers: configuration errors are fatal at startup,
//! connection-setup errors are retried by the pool before surfacing, and
//! query errors are never retried.

use std::io;

/// Main error type for the vertigate service
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration errors (fatal, startup-only)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection-establishment errors (surfaced after the retry budget)
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// Query execution errors
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration loading/validation errors
///
/// Only *structural* violations land here; a missing or unparsable value
/// degrades to its documented default with a logged warning instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No allowed schemas after parsing ALLOWED_SCHEMAS
    #[error("At least one allowed schema must be configured")]
    NoAllowedSchemas,

    /// DB_CONNECTION_RETRIES must permit at least one attempt
    #[error("DB_CONNECTION_RETRIES must be at least 1 (got {0})")]
    InvalidRetryCount(i64),

    /// DB_CONNECTION_RETRY_BACKOFF_S must not be negative
    #[error("DB_CONNECTION_RETRY_BACKOFF_S must not be negative (got {0})")]
    NegativeBackoff(f64),

    /// Malformed DB_BACKUP_NODES entry
    #[error("Invalid DB_BACKUP_NODES entry: {0}")]
    InvalidBackupNode(String),

    /// DB_TLSMODE outside the accepted set
    #[error(
        "DB_TLSMODE must be one of disable, allow, prefer, require, verify-ca, verify-full (got {0:?})"
    )]
    InvalidTlsMode(String),

    /// DB_USE_SSL that is neither truthy nor falsy
    #[error("DB_USE_SSL must be a boolean value (got {0:?})")]
    InvalidUseSsl(String),

    /// Invalid runtime database override
    #[error("Invalid database override: {0}")]
    InvalidOverride(String),
}

/// Connection-establishment failures, classified for remediation
///
/// Classification inspects OS error codes and driver message text; anything
/// unrecognized stays [`ConnectError::Unclassified`]. All message payloads are
/// credential-redacted before construction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The database host name did not resolve
    #[error("Could not resolve database host {host:?}: {detail}. Check the DB_HOST setting.")]
    HostResolution { host: String, detail: String },

    /// No route to the database network
    #[error(
        "Network unreachable while connecting to {host}:{port}: {detail}. \
         Check DB_HOST/DB_PORT and network routing to the Vertica cluster."
    )]
    NetworkUnreachable {
        host: String,
        port: u16,
        detail: String,
    },

    /// The host refused the TCP connection
    #[error(
        "Connection refused by {host}:{port}: {detail}. \
         Check DB_PORT and that Vertica is accepting connections."
    )]
    ConnectionRefused {
        host: String,
        port: u16,
        detail: String,
    },

    /// The server rejected the credentials
    #[error(
        "Authentication failed for user {user:?}: {detail}. \
         Check the DB_USER and DB_PASSWORD settings."
    )]
    AuthenticationFailure { user: String, detail: String },

    /// Anything the classifier did not recognize
    #[error("Connection failed: {0}")]
    Unclassified(String),
}

impl ConnectError {
    /// Short kind name, used for retry-state snapshots and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConnectError::HostResolution { .. } => "HostResolution",
            ConnectError::NetworkUnreachable { .. } => "NetworkUnreachable",
            ConnectError::ConnectionRefused { .. } => "ConnectionRefused",
            ConnectError::AuthenticationFailure { .. } => "AuthenticationFailure",
            ConnectError::Unclassified(_) => "Unclassified",
        }
    }
}

/// Query execution errors
///
/// `TemplateNotFound`, `SchemaNotAllowed`, `InvalidIdentifier`, and
/// `MissingParameter` are caller errors and are never retried. `Timeout` and
/// `Driver` leave the connection discarded rather than pooled.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// No template file with that name
    #[error("SQL template not found: {0}")]
    TemplateNotFound(String),

    /// Template or parameters reference schemas outside the allowlist
    #[error("Schemas not allowed: {0:?}")]
    SchemaNotAllowed(Vec<String>),

    /// A schema parameter that is not a bare identifier
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A placeholder in the template with no matching parameter
    #[error("Missing parameter for placeholder :{0}")]
    MissingParameter(String),

    /// The statement exceeded the configured wall-clock budget
    #[error("Query timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Connection establishment failed underneath the executor
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Driver-level execution failure (message credential-redacted)
    #[error("Query execution failed: {0}")]
    Driver(String),
}

/// Specialized Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Specialized Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for connection establishment
pub type ConnectResult<T> = std::result::Result<T, ConnectError>;

/// Specialized Result type for query execution
pub type QueryResult<T> = std::result::Result<T, QueryError>;
