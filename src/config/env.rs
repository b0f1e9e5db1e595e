//! Environment-variable parsing helpers
//!
//! Every configuration key can be supplied directly (`DB_HOST`) or through a
//! `VERTIGATE_`-prefixed alias (`VERTIGATE_DB_HOST`); the direct key wins.
//! Empty or whitespace-only values are treated as unset so operators can
//! clear optional settings without deleting them.
//!
//! Missing or unparsable values degrade to their documented defaults with a
//! warning rather than failing startup — the service should come up in a
//! diagnosable state even when the environment is incomplete. Backup-node
//! parsing is the one deliberate exception: a malformed `DB_BACKUP_NODES`
//! entry is a hard construction error.

use crate::error::{ConfigError, ConfigResult};

/// Alias prefix consulted when the direct key is unset.
pub const ENV_PREFIX: &str = "VERTIGATE_";

/// A source of configuration values, abstracted over the lookup function so
/// tests can construct isolated instances without touching process state.
pub(crate) struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// Read `key`, falling back to the prefixed alias. Blank values count as
    /// unset.
    pub fn raw(&self, key: &str) -> Option<String> {
        let value = (self.lookup)(key).or_else(|| (self.lookup)(&format!("{ENV_PREFIX}{key}")));
        match value {
            Some(v) if !v.trim().is_empty() => Some(v),
            _ => None,
        }
    }

    pub fn string_or(&self, key: &str, default: &str, warn_missing: bool) -> String {
        match self.raw(key) {
            Some(v) => v,
            None => {
                if warn_missing {
                    log_default(key, default, "missing");
                }
                default.to_string()
            }
        }
    }

    pub fn opt_string(&self, key: &str) -> Option<String> {
        self.raw(key).map(|v| v.trim().to_string())
    }

    pub fn i64_or(&self, key: &str, default: i64, warn_missing: bool) -> i64 {
        match self.raw(key) {
            None => {
                if warn_missing {
                    log_default(key, &default.to_string(), "missing");
                }
                default
            }
            Some(v) => match v.trim().parse::<i64>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    log_default(
                        key,
                        &default.to_string(),
                        &format!("invalid integer value {v:?}"),
                    );
                    default
                }
            },
        }
    }

    pub fn f64_or(&self, key: &str, default: f64, warn_missing: bool) -> f64 {
        match self.raw(key) {
            None => {
                if warn_missing {
                    log_default(key, &default.to_string(), "missing");
                }
                default
            }
            Some(v) => match v.trim().parse::<f64>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    log_default(
                        key,
                        &default.to_string(),
                        &format!("invalid float value {v:?}"),
                    );
                    default
                }
            },
        }
    }

    /// Booleans accept 1/true/yes/on and 0/false/no/off, case-insensitively.
    /// Anything else falls back to the default with a warning.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            None => default,
            Some(v) => match parse_bool(&v) {
                Some(parsed) => parsed,
                None => {
                    log_default(
                        key,
                        &default.to_string(),
                        &format!("invalid boolean value {v:?}"),
                    );
                    default
                }
            },
        }
    }

    /// Comma-separated list; empty entries are dropped. Falls back wholesale
    /// when the key is unset.
    pub fn csv_or(&self, key: &str, fallback: &[&str]) -> Vec<String> {
        match self.raw(key) {
            None => fallback.iter().map(|s| s.to_string()).collect(),
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Strict boolean parse used both for soft-defaulting flags and for the
/// hard-validated `DB_USE_SSL`.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn log_default(key: &str, default: &str, reason: &str) {
    tracing::warn!("{key} is not configured ({reason}); falling back to default {default:?}");
}

/// Parse `DB_BACKUP_NODES`: comma-separated `host[:port]` entries, the port
/// defaulting to the primary port. Malformed entries are hard errors, never
/// silently defaulted.
pub(crate) fn parse_backup_nodes(
    raw: Option<&str>,
    default_port: u16,
) -> ConfigResult<Vec<(String, u16)>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let mut nodes = Vec::new();
    for entry in raw.split(',') {
        let candidate = entry.trim();
        if candidate.is_empty() {
            continue;
        }

        let (host, port) = match candidate.rsplit_once(':') {
            Some((host_part, port_part)) => {
                let host = host_part.trim();
                let port_text = port_part.trim();
                if host.is_empty() {
                    return Err(ConfigError::InvalidBackupNode(format!(
                        "{candidate:?}: a hostname is required before the colon"
                    )));
                }
                if port_text.is_empty() {
                    return Err(ConfigError::InvalidBackupNode(format!(
                        "{candidate:?}: a port number is required after the colon"
                    )));
                }
                let port: u32 = port_text.parse().map_err(|_| {
                    ConfigError::InvalidBackupNode(format!(
                        "{candidate:?}: port values must be integers"
                    ))
                })?;
                if !(1..=65535).contains(&port) {
                    return Err(ConfigError::InvalidBackupNode(format!(
                        "{candidate:?}: ports must be between 1 and 65535"
                    )));
                }
                (host.to_string(), port as u16)
            }
            None => (candidate.to_string(), default_port),
        };

        nodes.push((host, port));
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> EnvSource<impl Fn(&str) -> Option<String> + use<>> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSource::new(move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn test_direct_key_wins_over_prefixed() {
        let env = source(&[("DB_HOST", "direct"), ("VERTIGATE_DB_HOST", "aliased")]);
        assert_eq!(env.raw("DB_HOST").as_deref(), Some("direct"));
    }

    #[test]
    fn test_prefixed_alias_used_when_direct_unset() {
        let env = source(&[("VERTIGATE_DB_HOST", "aliased")]);
        assert_eq!(env.raw("DB_HOST").as_deref(), Some("aliased"));
    }

    #[test]
    fn test_blank_value_counts_as_unset() {
        let env = source(&[("DB_HOST", "   ")]);
        assert_eq!(env.raw("DB_HOST"), None);
        assert_eq!(env.string_or("DB_HOST", "fallback", false), "fallback");
    }

    #[test]
    fn test_invalid_integer_falls_back() {
        let env = source(&[("MAX_ROWS", "not-a-number")]);
        assert_eq!(env.i64_or("MAX_ROWS", 1000, false), 1000);
    }

    #[test]
    fn test_bool_accepts_documented_spellings() {
        for truthy in ["1", "true", "YES", "On"] {
            let env = source(&[("DB_DEBUG", truthy)]);
            assert!(env.bool_or("DB_DEBUG", false), "{truthy} should be true");
        }
        for falsy in ["0", "false", "NO", "Off"] {
            let env = source(&[("DB_DEBUG", falsy)]);
            assert!(!env.bool_or("DB_DEBUG", true), "{falsy} should be false");
        }
    }

    #[test]
    fn test_bool_garbage_falls_back() {
        let env = source(&[("DB_DEBUG", "maybe")]);
        assert!(env.bool_or("DB_DEBUG", true));
        assert!(!env.bool_or("DB_DEBUG", false));
    }

    #[test]
    fn test_csv_drops_empty_entries() {
        let env = source(&[("ALLOWED_SCHEMAS", " public , analytics ,, ")]);
        assert_eq!(env.csv_or("ALLOWED_SCHEMAS", &["x"]), vec![
            "public".to_string(),
            "analytics".to_string()
        ]);
    }

    #[test]
    fn test_csv_fallback_when_unset() {
        let env = source(&[]);
        assert_eq!(env.csv_or("ALLOWED_SCHEMAS", &["public"]), vec![
            "public".to_string()
        ]);
    }

    #[test]
    fn test_backup_nodes_parse_happy_path() {
        let nodes = parse_backup_nodes(Some("node2:5434, node3"), 5433).unwrap();
        assert_eq!(nodes, vec![
            ("node2".to_string(), 5434),
            ("node3".to_string(), 5433)
        ]);
    }

    #[test]
    fn test_backup_nodes_missing_port_is_hard_error() {
        assert!(matches!(
            parse_backup_nodes(Some("host:"), 5433),
            Err(ConfigError::InvalidBackupNode(_))
        ));
    }

    #[test]
    fn test_backup_nodes_missing_host_is_hard_error() {
        assert!(matches!(
            parse_backup_nodes(Some(":5433"), 5433),
            Err(ConfigError::InvalidBackupNode(_))
        ));
    }

    #[test]
    fn test_backup_nodes_port_out_of_range_is_hard_error() {
        assert!(matches!(
            parse_backup_nodes(Some("host:999999"), 5433),
            Err(ConfigError::InvalidBackupNode(_))
        ));
        assert!(matches!(
            parse_backup_nodes(Some("host:0"), 5433),
            Err(ConfigError::InvalidBackupNode(_))
        ));
    }

    #[test]
    fn test_backup_nodes_non_integer_port_is_hard_error() {
        assert!(matches!(
            parse_backup_nodes(Some("host:abc"), 5433),
            Err(ConfigError::InvalidBackupNode(_))
        ));
    }
}
