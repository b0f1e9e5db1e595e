//! Template files and named-placeholder binding
//!
//! A template is re-read from disk on every call so operators can edit SQL
//! without restarting the gateway. Placeholders use the `:name` syntax and
//! are rendered client-side into SQL literals, which is how the upstream
//! Vertica drivers bind named parameters as well; a double colon (`::type`
//! casts) is never treated as a placeholder.

use crate::error::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Parameter map passed to execution, ordered for reproducible provenance.
pub type Params = BTreeMap<String, ParamValue>;

/// A single bindable parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a SQL literal. Strings are single-quoted with embedded
    /// quotes doubled; non-finite floats have no SQL spelling and become
    /// NULL.
    fn to_sql_literal(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::Bool(true) => "TRUE".to_string(),
            ParamValue::Bool(false) => "FALSE".to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) if f.is_finite() => f.to_string(),
            ParamValue::Float(_) => "NULL".to_string(),
            ParamValue::Text(s) => {
                let escaped = s.replace('\0', "").replace('\'', "''");
                format!("'{escaped}'")
            }
        }
    }
}

// One or more colons followed by an identifier. Only a single-colon match is
// a placeholder; longer runs are `::type` casts and pass through untouched.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(:+)([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern is valid")
});

// `identifier.` — the textual schema-qualifier scan.
static SCHEMA_QUALIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\.").expect("qualifier pattern is valid"));

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

static TEMPLATE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("name pattern is valid"));

/// True for bare SQL identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(value: &str) -> bool {
    IDENT_RE.is_match(value)
}

/// Load a template by name from `dir`.
///
/// Names must be simple file names; anything with path separators or parent
/// components is treated the same as a missing template, so the gateway can
/// never read outside its template root.
pub fn load(dir: &Path, name: &str) -> QueryResult<String> {
    if !TEMPLATE_NAME_RE.is_match(name) || name.contains("..") {
        return Err(QueryError::TemplateNotFound(name.to_string()));
    }

    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(QueryError::TemplateNotFound(name.to_string()))
        }
        Err(e) => Err(QueryError::Driver(format!(
            "failed to read template {name}: {e}"
        ))),
    }
}

/// Placeholder names referenced by `sql` (single-colon occurrences only).
pub fn placeholder_names(sql: &str) -> HashSet<String> {
    PLACEHOLDER_RE
        .captures_iter(sql)
        .filter(|caps| caps[1].len() == 1)
        .map(|caps| caps[2].to_string())
        .collect()
}

/// Schema qualifiers referenced by `sql`, per the `identifier.` textual scan.
///
/// This is a deliberate heuristic, not a SQL parser: it can both miss
/// references hidden in strings and over-match dotted tokens such as table
/// aliases. It exists as defense-in-depth on top of parameter validation.
pub fn schema_qualifiers(sql: &str) -> HashSet<String> {
    SCHEMA_QUALIFIER_RE
        .captures_iter(sql)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitute every placeholder in `sql` with the matching parameter rendered
/// as a SQL literal. A placeholder without a parameter is an error; unused
/// parameters are fine.
pub fn render(sql: &str, params: &Params) -> QueryResult<String> {
    for name in placeholder_names(sql) {
        if !params.contains_key(&name) {
            return Err(QueryError::MissingParameter(name));
        }
    }

    let rendered = PLACEHOLDER_RE.replace_all(sql, |caps: &regex::Captures<'_>| {
        let colons = &caps[1];
        let name = &caps[2];
        if colons.len() == 1 {
            params
                .get(name)
                .map(ParamValue::to_sql_literal)
                .unwrap_or_else(|| caps[0].to_string())
        } else {
            caps[0].to_string()
        }
    });

    Ok(rendered.into_owned())
}

/// Wrap a statement so it is row-capped even when the template author forgot
/// a limit clause. Trailing semicolons are trimmed so the subselect stays
/// valid.
pub fn wrap_with_limit(sql: &str) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT * FROM ( {trimmed} ) AS t LIMIT :limit")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_placeholder_names_ignores_casts() {
        let names = placeholder_names("SELECT :a, b::int, :c_d FROM t");
        assert!(names.contains("a"));
        assert!(names.contains("c_d"));
        assert!(!names.contains("int"));
    }

    #[test]
    fn test_schema_qualifiers_found() {
        let refs = schema_qualifiers("SELECT * FROM analytics.events JOIN ops.jobs ON 1=1");
        assert!(refs.contains("analytics"));
        assert!(refs.contains("ops"));
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_render_substitutes_literals() {
        let sql = render(
            "SELECT * FROM t WHERE name = :name AND n > :n AND ok = :ok",
            &params(&[
                ("name", ParamValue::Text("alpha".to_string())),
                ("n", ParamValue::Int(5)),
                ("ok", ParamValue::Bool(true)),
            ]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE name = 'alpha' AND n > 5 AND ok = TRUE");
    }

    #[test]
    fn test_render_escapes_quotes() {
        let sql = render(
            "SELECT :q",
            &params(&[("q", ParamValue::Text("it's; DROP".to_string()))]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT 'it''s; DROP'");
    }

    #[test]
    fn test_render_keeps_casts() {
        let sql = render(
            "SELECT :v::varchar",
            &params(&[("v", ParamValue::Int(1))]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT 1::varchar");
    }

    #[test]
    fn test_render_missing_parameter_errors() {
        let result = render("SELECT :absent", &params(&[]));
        assert!(matches!(result, Err(QueryError::MissingParameter(name)) if name == "absent"));
    }

    #[test]
    fn test_wrap_with_limit_trims_semicolon() {
        assert_eq!(
            wrap_with_limit("SELECT 1;\n"),
            "SELECT * FROM ( SELECT 1 ) AS t LIMIT :limit"
        );
    }

    #[test]
    fn test_load_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["../escape.sql", "a/b.sql", "..", ".hidden"] {
            assert!(
                matches!(
                    load(dir.path(), name),
                    Err(QueryError::TemplateNotFound(_))
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path(), "absent.sql"),
            Err(QueryError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_load_reads_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("probe.sql"), "SELECT 1").unwrap();
        assert_eq!(load(dir.path(), "probe.sql").unwrap(), "SELECT 1");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("public"));
        assert!(is_identifier("_x9"));
        assert!(!is_identifier("9x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }
}
