//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: the bot's TOML config file (BotConfig, ServerConfig, PluginsConfig)
//! - [`validation`]: startup checks over a loaded [`BotConfig`]
//! - [`store`]: the runtime key/value store plugins read settings and
//!   enablement flags from

mod store;
mod types;
mod validation;

pub use store::{ConfigStore, ConfigStoreExt, FileConfig, MemoryConfig, StoreError, plugin_key};
pub use types::{
    BotConfig, BotSettings, ConfigError, DatabaseConfig, PluginsConfig, ServerConfig,
    resolve_home_relative,
};
pub use validation::{ValidationError, validate};
