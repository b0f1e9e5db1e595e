//! Safe execution of parametrized SQL templates
//!
//! Templates are plain-text SQL files with `:name` placeholders, one file per
//! named operation. The executor enforces the schema allowlist, injects a row
//! cap, and runs every statement under a wall-clock timeout through a pooled
//! connection; the rank merger composes several templated queries into one
//! ranked list.

pub mod executor;
pub mod rank;
pub mod template;

pub use executor::{Provenance, QueryExecutor};
pub use rank::ranked_multi;
pub use template::{ParamValue, Params};
