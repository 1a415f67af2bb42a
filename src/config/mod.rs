//! Configuration module for tabula.
//!
//! Settings are read from TOML and projected into the option structs the
//! graph and aggregate code take as explicit parameters.

mod settings;

pub use settings::{
    expand_env_vars, AggregateSettings, CacheSettings, LoggingSettings, Settings, SettingsError,
    ValidationSettings,
};
