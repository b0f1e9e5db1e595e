//! Runtime settings for the gateway
//!
//! All tuning is sourced from environment variables so the service can be
//! deployed safely across environments. Every consumer of configuration goes
//! through [`Settings`] (or its shared handle [`SharedSettings`]) to avoid
//! duplicated parsing logic.
//!
//! The connection target can later be replaced at runtime through
//! [`SharedSettings::apply_database_overrides`] and restored with
//! [`SharedSettings::reload_from_environment`]; both must be followed by a
//! pool reset by the caller, since pool sizing and target may have changed.

use crate::config::env::{EnvSource, parse_backup_nodes, parse_bool};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

// Placeholder connection defaults. The loopback address keeps an incomplete
// deployment from pointing at someone else's database; the service starts in
// a degraded, diagnosable state until real credentials are supplied.
pub const DEFAULT_DB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_PORT: u16 = 5433;
pub const DEFAULT_DB_USER: &str = "vertigate_app";
pub const DEFAULT_DB_PASSWORD: &str = "change-me-please";
pub const DEFAULT_DB_NAME: &str = "vertica";

/// How long a single physical connection attempt may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS negotiation mode for the database session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl TlsMode {
    fn parse(value: &str) -> ConfigResult<TlsMode> {
        match value.trim().to_lowercase().as_str() {
            "disable" => Ok(TlsMode::Disable),
            "allow" => Ok(TlsMode::Allow),
            "prefer" => Ok(TlsMode::Prefer),
            "require" => Ok(TlsMode::Require),
            "verify-ca" => Ok(TlsMode::VerifyCa),
            "verify-full" => Ok(TlsMode::VerifyFull),
            other => Err(ConfigError::InvalidTlsMode(other.to_string())),
        }
    }
}

/// Where the current connection target came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseSource {
    /// Derived from process environment at load time
    Environment,
    /// Replaced through the runtime override API
    Runtime,
}

/// Gateway configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,

    /// Global row cap applied to every executed statement
    pub max_rows: u64,
    /// Wall-clock budget for a single execute+fetch
    pub query_timeout_s: u64,
    /// Capacity of the connection cache
    pub pool_size: usize,

    pub connection_attempts: u32,
    pub connection_retry_backoff_s: f64,

    pub http_token: Option<String>,
    pub cors_origins: Option<String>,

    /// Schemas a statement may reference, in priority order
    pub allowed_schemas: Vec<String>,

    /// Raises connection diagnostics to debug-level detail
    pub db_debug_logging: bool,

    pub backup_nodes: Vec<(String, u16)>,

    pub tls_mode: Option<TlsMode>,
    pub use_ssl: Option<bool>,
    pub tls_cafile: Option<String>,
    pub tls_certfile: Option<String>,
    pub tls_keyfile: Option<String>,

    database_source: DatabaseSource,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn load() -> ConfigResult<Settings> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary lookup function.
    ///
    /// Missing values degrade to defaults with a warning; only structural
    /// violations (no allowed schemas, non-positive retry count, negative
    /// backoff, malformed backup nodes, bad TLS settings) fail construction.
    pub fn load_from<F: Fn(&str) -> Option<String>>(lookup: F) -> ConfigResult<Settings> {
        let env = EnvSource::new(lookup);

        let host = env.string_or("DB_HOST", DEFAULT_DB_HOST, true);
        let port = read_port(&env, "DB_PORT", DEFAULT_DB_PORT, true);
        let user = env.string_or("DB_USER", DEFAULT_DB_USER, true);
        let password = env.string_or("DB_PASSWORD", DEFAULT_DB_PASSWORD, true);
        let database = env.string_or("DB_NAME", DEFAULT_DB_NAME, true);

        let max_rows = floor_one(env.i64_or("MAX_ROWS", 1000, false), "MAX_ROWS") as u64;
        let query_timeout_s =
            floor_one(env.i64_or("QUERY_TIMEOUT_S", 15, false), "QUERY_TIMEOUT_S") as u64;
        let pool_size = floor_one(env.i64_or("POOL_SIZE", 8, false), "POOL_SIZE") as usize;

        let connection_attempts = env.i64_or("DB_CONNECTION_RETRIES", 3, false);
        if connection_attempts < 1 {
            return Err(ConfigError::InvalidRetryCount(connection_attempts));
        }

        let connection_retry_backoff_s =
            env.f64_or("DB_CONNECTION_RETRY_BACKOFF_S", 0.5, false);
        if connection_retry_backoff_s < 0.0 {
            return Err(ConfigError::NegativeBackoff(connection_retry_backoff_s));
        }

        let allowed_schemas = env.csv_or("ALLOWED_SCHEMAS", &["public"]);
        if allowed_schemas.is_empty() {
            return Err(ConfigError::NoAllowedSchemas);
        }

        let backup_nodes = parse_backup_nodes(env.raw("DB_BACKUP_NODES").as_deref(), port)?;

        let tls_mode = match env.raw("DB_TLSMODE") {
            Some(raw) => Some(TlsMode::parse(&raw)?),
            None => None,
        };
        let use_ssl = match env.raw("DB_USE_SSL") {
            Some(raw) => match parse_bool(&raw) {
                Some(b) => Some(b),
                None => return Err(ConfigError::InvalidUseSsl(raw)),
            },
            None => None,
        };

        Ok(Settings {
            host,
            port,
            user,
            password,
            database,
            max_rows,
            query_timeout_s,
            pool_size,
            connection_attempts: connection_attempts as u32,
            connection_retry_backoff_s,
            http_token: env.opt_string("HTTP_TOKEN"),
            cors_origins: env.opt_string("CORS_ORIGINS"),
            allowed_schemas,
            db_debug_logging: env.bool_or("DB_DEBUG", false),
            backup_nodes,
            tls_mode,
            use_ssl,
            tls_cafile: env.opt_string("DB_TLS_CAFILE"),
            tls_certfile: env.opt_string("DB_TLS_CERTFILE"),
            tls_keyfile: env.opt_string("DB_TLS_KEYFILE"),
            database_source: DatabaseSource::Environment,
        })
    }

    /// First allowed schema, used as the default for schema-bound operations.
    pub fn default_schema(&self) -> &str {
        &self.allowed_schemas[0]
    }

    /// Lower-cased allowed schema names. Recomputed on demand because runtime
    /// overrides may change the list underneath long-lived consumers.
    pub fn allowed_schema_set(&self) -> HashSet<String> {
        self.allowed_schemas
            .iter()
            .map(|s| s.to_lowercase())
            .collect()
    }

    /// True when the connection target still matches the repository
    /// placeholder values; health checks report the service as degraded.
    pub fn using_placeholder_credentials(&self) -> bool {
        self.host == DEFAULT_DB_HOST
            && self.user == DEFAULT_DB_USER
            && self.password == DEFAULT_DB_PASSWORD
            && self.database == DEFAULT_DB_NAME
    }

    pub fn database_source(&self) -> DatabaseSource {
        self.database_source
    }

    /// Connection target and TLS material for the connector.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            backup_nodes: self.backup_nodes.clone(),
            tls_mode: self.tls_mode,
            use_ssl: self.use_ssl,
            tls_cafile: self.tls_cafile.clone(),
            tls_certfile: self.tls_certfile.clone(),
            tls_keyfile: self.tls_keyfile.clone(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

fn read_port<F: Fn(&str) -> Option<String>>(
    env: &EnvSource<F>,
    key: &str,
    default: u16,
    warn_missing: bool,
) -> u16 {
    let value = env.i64_or(key, i64::from(default), warn_missing);
    if (1..=65535).contains(&value) {
        value as u16
    } else {
        tracing::warn!(
            "{key} value {value} is outside the valid TCP port range; falling back to {default}"
        );
        default
    }
}

fn floor_one(value: i64, key: &str) -> i64 {
    if value < 1 {
        tracing::warn!("{key} must be at least 1 (got {value}); clamping to 1");
        1
    } else {
        value
    }
}

/// Everything the connector needs to open one physical connection
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub backup_nodes: Vec<(String, u16)>,
    pub tls_mode: Option<TlsMode>,
    pub use_ssl: Option<bool>,
    pub tls_cafile: Option<String>,
    pub tls_certfile: Option<String>,
    pub tls_keyfile: Option<String>,
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    /// Whether the session should negotiate TLS at all.
    pub fn wants_tls(&self) -> bool {
        match self.tls_mode {
            Some(TlsMode::Disable) => false,
            Some(_) => true,
            None => self.use_ssl.unwrap_or(false),
        }
    }
}

/// Runtime database configuration supplied via the admin API
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseOverrides {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DatabaseOverrides {
    /// Trim every field and reject empties and out-of-range ports.
    pub fn validated(self) -> ConfigResult<DatabaseOverrides> {
        let field = |name: &str, value: &str| -> ConfigResult<String> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::InvalidOverride(format!(
                    "{name} must not be empty"
                )));
            }
            Ok(trimmed.to_string())
        };

        if self.port == 0 {
            return Err(ConfigError::InvalidOverride(
                "port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(DatabaseOverrides {
            host: field("host", &self.host)?,
            port: self.port,
            user: field("user", &self.user)?,
            password: field("password", &self.password)?,
            database: field("database", &self.database)?,
        })
    }
}

/// Shared handle to the live settings
///
/// Readers take consistent snapshots; the two mutating operations replace
/// fields atomically with respect to readers. Both mutations must be followed
/// by a `ConnectionPool::reset()` by the caller.
#[derive(Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Clone of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.read(|s| s.clone())
    }

    /// Run `f` against the current settings without cloning.
    pub fn read<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    /// Atomically replace the five connection fields and mark the target as
    /// runtime-sourced.
    pub fn apply_database_overrides(&self, overrides: DatabaseOverrides) -> ConfigResult<()> {
        let overrides = overrides.validated()?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.host = overrides.host;
        guard.port = overrides.port;
        guard.user = overrides.user;
        guard.password = overrides.password;
        guard.database = overrides.database;
        guard.database_source = DatabaseSource::Runtime;
        Ok(())
    }

    /// Re-derive every field from the environment, restoring the
    /// environment-sourced baseline.
    pub fn reload_from_environment(&self) -> ConfigResult<()> {
        self.reload_from(|key| std::env::var(key).ok())
    }

    /// Reload through an arbitrary lookup function (test seam).
    pub fn reload_from<F: Fn(&str) -> Option<String>>(&self, lookup: F) -> ConfigResult<()> {
        let refreshed = Settings::load_from(lookup)?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = refreshed;
        Ok(())
    }
}
