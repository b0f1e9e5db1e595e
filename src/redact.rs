//! Credential redaction for logs and surfaced error text
//!
//! Driver errors and connection-string fragments can echo passwords or
//! tokens verbatim. Every error message that might reach a log line, the
//! retry-state snapshot, or an HTTP response body is passed through
//! [`redact`] first.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker substituted for any sensitive value.
pub const REDACTION_MARKER: &str = "[REDACTED]";

// `password: x`, `password=x`, `token = "x"`, `secret: 'x'`, `api_key=x` —
// keys matched case-insensitively, values quoted or bare.
static KEY_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(password|passwd|pwd|token|secret|api[_-]?key)\b(\s*[:=]\s*)("[^"]*"|'[^']*'|\S+)"#,
    )
    .expect("redaction key/value pattern is valid")
});

// `Authorization: Bearer <token>` in headers or echoed request dumps.
static BEARER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(authorization\s*:\s*bearer)\s+\S+")
        .expect("redaction bearer pattern is valid")
});

/// Replace every sensitive value in `text` with [`REDACTION_MARKER`].
///
/// Matching is case-insensitive for both the key names and the `Bearer`
/// scheme. The key itself is kept so the message stays diagnosable.
pub fn redact(text: &str) -> String {
    let pass = KEY_VALUE_RE.replace_all(text, format!("$1$2{REDACTION_MARKER}").as_str());
    BEARER_RE
        .replace_all(&pass, format!("$1 {REDACTION_MARKER}").as_str())
        .into_owned()
}
