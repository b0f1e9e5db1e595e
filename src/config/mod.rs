//! Configuration management
//!
//! Handles environment-driven settings, runtime database overrides, and the
//! shared settings handle consumed by the pool and executor.

pub mod env;
pub mod settings;

pub use env::ENV_PREFIX;
pub use settings::{
    ConnectOptions, DatabaseOverrides, DatabaseSource, Settings, SharedSettings, TlsMode,
};
