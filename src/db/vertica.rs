//! Vertica connector
//!
//! Concrete [`Connector`] implementation. Vertica speaks the PostgreSQL
//! frontend/backend protocol, so the session is driven through
//! tokio-postgres, with rustls for TLS negotiation.
//!
//! Connection failures are classified here into remediation-bearing error
//! kinds by inspecting OS error codes and driver message text; everything
//! that reaches an error payload is credential-redacted first.

use crate::config::{ConnectOptions, TlsMode};
use crate::db::connector::{Connector, DriverFailure, SqlClient};
use crate::db::types::{CellValue, SqlRow};
use crate::error::{ConnectError, ConnectResult};
use crate::redact::redact;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::error::Error as _;
use tokio_postgres::types::Type;

/// Opens Vertica sessions over the PostgreSQL wire protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct VerticaConnector;

/// One live Vertica session
pub struct VerticaClient {
    client: tokio_postgres::Client,
}

#[async_trait]
impl Connector for VerticaConnector {
    type Conn = VerticaClient;

    async fn connect(&self, options: &ConnectOptions) -> ConnectResult<VerticaClient> {
        let config = build_config(options);

        let client = if options.wants_tls() {
            let tls_config = make_tls_config(options)?;
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            let (client, connection) = config
                .connect(tls)
                .await
                .map_err(|e| classify_connect_error(&e, options))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::debug!("database session ended: {}", redact(&e.to_string()));
                }
            });
            client
        } else {
            let (client, connection) = config
                .connect(tokio_postgres::NoTls)
                .await
                .map_err(|e| classify_connect_error(&e, options))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::debug!("database session ended: {}", redact(&e.to_string()));
                }
            });
            client
        };

        Ok(VerticaClient { client })
    }
}

#[async_trait]
impl SqlClient for VerticaClient {
    async fn fetch(&self, sql: &str) -> Result<Vec<SqlRow>, DriverFailure> {
        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| DriverFailure(e.to_string()))?;

        let pg_rows = self
            .client
            .query(&stmt, &[])
            .await
            .map_err(|e| DriverFailure(e.to_string()))?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut values = Vec::with_capacity(pg_row.len());
            for idx in 0..pg_row.len() {
                values.push(extract_cell(pg_row, idx));
            }
            rows.push(SqlRow::new(values));
        }
        Ok(rows)
    }
}

/// Assemble the driver configuration: primary host first, then each backup
/// node in declared order (the driver tries them sequentially).
fn build_config(options: &ConnectOptions) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&options.host)
        .port(options.port)
        .user(&options.user)
        .password(&options.password)
        .dbname(&options.database)
        .connect_timeout(options.connect_timeout);

    for (host, port) in &options.backup_nodes {
        config.host(host);
        config.port(*port);
    }

    config.ssl_mode(match options.tls_mode {
        Some(TlsMode::Disable) => tokio_postgres::config::SslMode::Disable,
        Some(TlsMode::Allow) | Some(TlsMode::Prefer) => tokio_postgres::config::SslMode::Prefer,
        Some(TlsMode::Require) | Some(TlsMode::VerifyCa) | Some(TlsMode::VerifyFull) => {
            tokio_postgres::config::SslMode::Require
        }
        None => {
            if options.use_ssl.unwrap_or(false) {
                tokio_postgres::config::SslMode::Require
            } else {
                tokio_postgres::config::SslMode::Disable
            }
        }
    });

    config
}

/// Build a rustls ClientConfig.
///
/// An operator-supplied CA bundle takes precedence; otherwise OS certificates
/// are trusted with the Mozilla roots as a fallback. A client certificate and
/// key are attached when both are configured.
fn make_tls_config(options: &ConnectOptions) -> ConnectResult<rustls::ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();

    if let Some(cafile) = &options.tls_cafile {
        let pem = std::fs::read(cafile).map_err(|e| {
            ConnectError::Unclassified(format!(
                "could not read DB_TLS_CAFILE {cafile:?}: {e}"
            ))
        })?;
        for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
            let cert = cert.map_err(|e| {
                ConnectError::Unclassified(format!(
                    "could not parse certificate in DB_TLS_CAFILE {cafile:?}: {e}"
                ))
            })?;
            root_store.add(cert).map_err(|e| {
                ConnectError::Unclassified(format!(
                    "rejected certificate in DB_TLS_CAFILE {cafile:?}: {e}"
                ))
            })?;
        }
    } else {
        let native_certs = rustls_native_certs::load_native_certs();
        let mut loaded = 0;
        for cert in native_certs.certs {
            if root_store.add(cert).is_ok() {
                loaded += 1;
            }
        }
        if loaded == 0 {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);

    match (&options.tls_certfile, &options.tls_keyfile) {
        (Some(certfile), Some(keyfile)) => {
            let cert_pem = std::fs::read(certfile).map_err(|e| {
                ConnectError::Unclassified(format!(
                    "could not read DB_TLS_CERTFILE {certfile:?}: {e}"
                ))
            })?;
            let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    ConnectError::Unclassified(format!(
                        "could not parse DB_TLS_CERTFILE {certfile:?}: {e}"
                    ))
                })?;
            let key_pem = std::fs::read(keyfile).map_err(|e| {
                ConnectError::Unclassified(format!(
                    "could not read DB_TLS_KEYFILE {keyfile:?}: {e}"
                ))
            })?;
            let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
                .map_err(|e| {
                    ConnectError::Unclassified(format!(
                        "could not parse DB_TLS_KEYFILE {keyfile:?}: {e}"
                    ))
                })?
                .ok_or_else(|| {
                    ConnectError::Unclassified(format!(
                        "DB_TLS_KEYFILE {keyfile:?} contains no private key"
                    ))
                })?;
            builder.with_client_auth_cert(certs, key).map_err(|e| {
                ConnectError::Unclassified(format!("invalid client certificate/key pair: {e}"))
            })
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Map a driver error to a remediation-bearing kind.
///
/// Recognizers, in order: SQLSTATE class 28 (invalid authorization), IO error
/// kinds and errno values on the source chain, then message substrings. The
/// original text survives only in redacted form.
pub(crate) fn classify_connect_error(
    err: &tokio_postgres::Error,
    options: &ConnectOptions,
) -> ConnectError {
    if let Some(db) = err.as_db_error() {
        if db.code().code().starts_with("28") {
            return ConnectError::AuthenticationFailure {
                user: options.user.clone(),
                detail: redact(db.message()),
            };
        }
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if let Some(classified) = classify_io_error(io, options) {
                return classified;
            }
        }
        source = cause.source();
    }

    let detail = redact(&err.to_string());
    let lower = detail.to_lowercase();
    if lower.contains("password authentication")
        || lower.contains("authentication failed")
        || lower.contains("invalid username or password")
    {
        return ConnectError::AuthenticationFailure {
            user: options.user.clone(),
            detail,
        };
    }

    ConnectError::Unclassified(detail)
}

fn classify_io_error(io: &std::io::Error, options: &ConnectOptions) -> Option<ConnectError> {
    use std::io::ErrorKind;

    let detail = redact(&io.to_string());

    match io.kind() {
        ErrorKind::ConnectionRefused => {
            return Some(ConnectError::ConnectionRefused {
                host: options.host.clone(),
                port: options.port,
                detail,
            });
        }
        ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => {
            return Some(ConnectError::NetworkUnreachable {
                host: options.host.clone(),
                port: options.port,
                detail,
            });
        }
        _ => {}
    }

    // ENETUNREACH / EHOSTUNREACH on platforms where the kind is Other.
    if matches!(io.raw_os_error(), Some(101) | Some(113)) {
        return Some(ConnectError::NetworkUnreachable {
            host: options.host.clone(),
            port: options.port,
            detail,
        });
    }

    let lower = detail.to_lowercase();
    if lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
        || lower.contains("no such host")
    {
        return Some(ConnectError::HostResolution {
            host: options.host.clone(),
            detail,
        });
    }

    None
}

/// Extract a cell from a driver row.
///
/// Typed extraction for the common analytical types, with a string fallback
/// for everything else (matching the gateway's text-forward JSON surface).
fn extract_cell(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    let ty = row.columns()[idx].type_();
    match *ty {
        Type::BOOL => match row.try_get::<_, Option<bool>>(idx) {
            Ok(Some(v)) => CellValue::Boolean(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        Type::INT2 => match row.try_get::<_, Option<i16>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        Type::INT4 => match row.try_get::<_, Option<i32>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        Type::INT8 => match row.try_get::<_, Option<i64>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        Type::FLOAT4 => match row.try_get::<_, Option<f32>>(idx) {
            Ok(Some(v)) => CellValue::Float(v as f64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        Type::FLOAT8 => match row.try_get::<_, Option<f64>>(idx) {
            Ok(Some(v)) => CellValue::Float(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(Some(v)) => CellValue::Text(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        Type::JSON | Type::JSONB => match row.try_get::<_, Option<serde_json::Value>>(idx) {
            Ok(Some(v)) => CellValue::Json(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        _ => try_as_string(row, idx),
    }
}

/// String fallback for type mismatches and exotic server types.
fn try_as_string(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            if let Ok(Some(v)) = row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
                return CellValue::Text(v.to_string());
            }
            if let Ok(Some(v)) = row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx) {
                return CellValue::Text(v.to_string());
            }
            if let Ok(Some(v)) = row.try_get::<_, Option<chrono::NaiveDate>>(idx) {
                return CellValue::Text(v.to_string());
            }
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to display: {}>", type_name))
        }
    }
}
