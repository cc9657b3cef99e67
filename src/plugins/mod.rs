//! Plugin contract and lifecycle management.
//!
//! Plugins are resolved through a [`PluginRegistry`], gated by their
//! `<name>:enabled` flag in the config store, loaded one at a time and kept
//! in an ordered active set.

mod auth;
mod registry;
mod users;

pub use auth::{AuthPlugin, AuthSettings};
pub use registry::{
    DiscoveryError, DiscoveryFailure, PluginFactory, PluginOrigin, PluginRegistry, PluginUnit,
};
pub use users::{UsersPlugin, UsersSettings};

use crate::bot::Bot;
use crate::config::plugin_key;
use crate::telemetry::spans;
use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

/// A pluggable behavior unit.
///
/// `name` is both the plugin's identity and its config namespace. Both
/// lifecycle hooks are optional.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Attach to the bot. An error keeps the plugin out of the active set.
    async fn load(&mut self, _bot: &Arc<Bot>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Wipe the plugin's data.
    async fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An active plugin.
#[derive(Clone)]
pub struct PluginRecord {
    pub name: String,
    pub instance: Arc<dyn Plugin>,
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Plugins whose reset failed. The remaining plugins were still reset.
#[derive(Debug)]
pub struct ResetError {
    pub failures: Vec<(String, anyhow::Error)>,
}

impl fmt::Display for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} plugin(s) failed to reset:", self.failures.len())?;
        for (name, e) in &self.failures {
            write!(f, " [{}: {}]", name, e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResetError {}

/// Ordered set of active plugins.
#[derive(Default)]
pub struct PluginManager {
    active: RwLock<Vec<PluginRecord>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover, gate and load every plugin the registry knows about.
    ///
    /// Entries are handled strictly in discovery order. Any failure is
    /// logged and only affects that entry. Returns the number of plugins
    /// activated by this pass.
    pub async fn load_all(&self, bot: &Arc<Bot>, registry: &PluginRegistry) -> usize {
        let mut loaded = 0;

        for entry in registry.discover().await {
            let unit = match entry {
                Ok(unit) => unit,
                Err(failure) => {
                    warn!(location = %failure.location, error = %failure.error, "Plugin discovery failed");
                    continue;
                }
            };

            if !Self::is_enabled(bot, &unit.name).await {
                continue;
            }

            let mut instance = unit.instantiate();
            let outcome = AssertUnwindSafe(instance.load(bot))
                .catch_unwind()
                .instrument(spans::plugin(&unit.name, "load"))
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(plugin = %unit.name, origin = %unit.origin, error = %e, "Plugin failed to load");
                    continue;
                }
                Err(_) => {
                    error!(plugin = %unit.name, origin = %unit.origin, "Plugin panicked while loading");
                    continue;
                }
            }

            info!(plugin = %unit.name, kind = %unit.kind, origin = %unit.origin, "Plugin loaded");
            self.active.write().push(PluginRecord {
                name: unit.name,
                instance: Arc::from(instance),
            });
            loaded += 1;
        }

        loaded
    }

    /// Consult `<name>:enabled`, recording `true` for first-seen plugins.
    async fn is_enabled(bot: &Bot, name: &str) -> bool {
        let key = plugin_key(name, "enabled");
        match bot.config().get(&key).await {
            Ok(Some(Value::Bool(false))) => {
                debug!(plugin = %name, "Plugin disabled");
                false
            }
            Ok(Some(_)) => true,
            Ok(None) => {
                if let Err(e) = bot.config().set(&key, Value::Bool(true)).await {
                    warn!(plugin = %name, error = %e, "Failed to record plugin as enabled");
                }
                true
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "Failed to read plugin enable flag");
                false
            }
        }
    }

    /// First active plugin registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.active
            .read()
            .iter()
            .find(|record| record.name == name)
            .map(|record| Arc::clone(&record.instance))
    }

    /// Names of the active plugins, in load order.
    pub fn names(&self) -> Vec<String> {
        self.active.read().iter().map(|r| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.active.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    /// Reset every active plugin in load order.
    ///
    /// A failing (or panicking) reset does not stop the others; all failures
    /// are returned together.
    pub async fn reset_all(&self) -> Result<(), ResetError> {
        let records = self.active.read().clone();
        let mut failures = Vec::new();

        for record in records {
            let outcome = AssertUnwindSafe(record.instance.reset())
                .catch_unwind()
                .instrument(spans::plugin(&record.name, "reset"))
                .await;

            match outcome {
                Ok(Ok(())) => debug!(plugin = %record.name, "Plugin reset"),
                Ok(Err(e)) => {
                    warn!(plugin = %record.name, error = %e, "Plugin reset failed");
                    failures.push((record.name, e));
                }
                Err(_) => {
                    error!(plugin = %record.name, "Plugin panicked while resetting");
                    failures.push((record.name, anyhow::anyhow!("reset panicked")));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ResetError { failures })
        }
    }
}
