//! Listen-address resolution for the HTTP transport
//!
//! The bind address is environment-driven with a safety rail: loopback
//! interfaces are only accepted when `ALLOW_LOOPBACK_LISTEN` is set, so a
//! containerized deployment does not silently bind where nothing can reach
//! it. Public addresses are rejected outright; this service is meant to sit
//! behind private networking.

use crate::config::env::parse_bool;
use std::net::IpAddr;

const BIND_HOST_KEYS: [&str; 4] = [
    "LISTEN_HOST",
    "VERTIGATE_LISTEN_HOST",
    "BIND_HOST",
    "VERTIGATE_BIND_HOST",
];
const BIND_PORT_KEYS: [&str; 5] = [
    "LISTEN_PORT",
    "VERTIGATE_LISTEN_PORT",
    "BIND_PORT",
    "VERTIGATE_BIND_PORT",
    "PORT",
];

pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 8000;

/// Whether loopback interfaces may be bound.
pub fn allow_loopback_listen<F: Fn(&str) -> Option<String>>(lookup: &F) -> bool {
    lookup("ALLOW_LOOPBACK_LISTEN")
        .and_then(|v| parse_bool(&v))
        .unwrap_or(false)
}

/// True when `value` is an IP address this service should bind to:
/// unspecified and private addresses always, loopback only when allowed,
/// anything public (or not an address at all) never.
pub fn is_bindable_listen_host(value: &str, allow_loopback: bool) -> bool {
    let candidate = value.trim();
    if candidate.is_empty() {
        return false;
    }

    let Ok(ip) = candidate.parse::<IpAddr>() else {
        return false;
    };

    if ip.is_unspecified() {
        return true;
    }
    if ip.is_loopback() {
        return allow_loopback;
    }
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        // fc00::/7 — IPv6 unique-local
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Determine the HTTP bind address.
pub fn resolve_listen_host<F: Fn(&str) -> Option<String>>(lookup: &F) -> String {
    let allow_loopback = allow_loopback_listen(lookup);

    for key in BIND_HOST_KEYS {
        let Some(value) = lookup(key) else { continue };
        let candidate = value.trim();
        if candidate.is_empty() {
            continue;
        }

        if is_bindable_listen_host(candidate, allow_loopback) {
            return candidate.to_string();
        }

        tracing::warn!("Ignoring {key} value {value:?}; not a bindable interface.");
        if matches!(candidate, "127.0.0.1" | "localhost") && !allow_loopback {
            tracing::warn!(
                "Set ALLOW_LOOPBACK_LISTEN=1 to bind vertigate to loopback interfaces explicitly."
            );
        }
    }

    DEFAULT_LISTEN_HOST.to_string()
}

/// Determine the HTTP listen port.
pub fn resolve_listen_port<F: Fn(&str) -> Option<String>>(lookup: &F) -> u16 {
    for key in BIND_PORT_KEYS {
        let Some(value) = lookup(key) else { continue };
        let candidate = value.trim();
        if candidate.is_empty() {
            continue;
        }

        match candidate.parse::<u32>() {
            Ok(port) if (1..=65535).contains(&port) => return port as u16,
            Ok(_) => {
                tracing::warn!(
                    "{key} value {value:?} is outside the valid TCP port range; ignoring."
                );
            }
            Err(_) => {
                tracing::warn!(
                    "Ignoring non-integer {key} value {value:?} when determining listen port."
                );
            }
        }
    }

    DEFAULT_LISTEN_PORT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_unspecified_is_always_bindable() {
        assert!(is_bindable_listen_host("0.0.0.0", false));
        assert!(is_bindable_listen_host("::", false));
    }

    #[test]
    fn test_loopback_requires_opt_in() {
        assert!(!is_bindable_listen_host("127.0.0.1", false));
        assert!(is_bindable_listen_host("127.0.0.1", true));
        assert!(is_bindable_listen_host("::1", true));
    }

    #[test]
    fn test_private_addresses_are_bindable() {
        assert!(is_bindable_listen_host("10.1.2.3", false));
        assert!(is_bindable_listen_host("192.168.0.5", false));
        assert!(is_bindable_listen_host("fd00::1", false));
    }

    #[test]
    fn test_public_and_hostnames_are_rejected() {
        assert!(!is_bindable_listen_host("8.8.8.8", true));
        assert!(!is_bindable_listen_host("example.com", true));
        assert!(!is_bindable_listen_host("", true));
    }

    #[test]
    fn test_resolve_host_skips_unbindable_values() {
        let env = lookup(&[
            ("LISTEN_HOST", "8.8.8.8"),
            ("BIND_HOST", "10.0.0.2"),
        ]);
        assert_eq!(resolve_listen_host(&env), "10.0.0.2");
    }

    #[test]
    fn test_resolve_host_defaults_to_any() {
        assert_eq!(resolve_listen_host(&lookup(&[])), DEFAULT_LISTEN_HOST);
    }

    #[test]
    fn test_resolve_port_skips_invalid_values() {
        let env = lookup(&[("LISTEN_PORT", "not-a-port"), ("PORT", "9001")]);
        assert_eq!(resolve_listen_port(&env), 9001);
    }

    #[test]
    fn test_resolve_port_rejects_out_of_range() {
        let env = lookup(&[("LISTEN_PORT", "99999")]);
        assert_eq!(resolve_listen_port(&env), DEFAULT_LISTEN_PORT);
    }
}
