//! Compiled-in plugin registry and discovery.
//!
//! Plugins are resolved from two ordered sources. The bundled list always
//! comes first. The optional user directory follows: each `*.toml` file in it
//! is a manifest naming a registered kind and, optionally, the instance name
//! (which is also its config namespace):
//!
//! ```toml
//! kind = "auth"
//! name = "auth-backup"
//! ```

use super::Plugin;
use super::auth::AuthPlugin;
use super::users::UsersPlugin;
use glob::Pattern;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Builds a plugin instance given its name.
pub type PluginFactory = Arc<dyn Fn(&str) -> Box<dyn Plugin> + Send + Sync>;

/// Where a plugin unit was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    Bundled,
    User(PathBuf),
}

impl fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => f.write_str("bundled"),
            Self::User(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A resolved, constructible plugin.
#[derive(Clone)]
pub struct PluginUnit {
    pub name: String,
    pub kind: String,
    pub origin: PluginOrigin,
    factory: PluginFactory,
}

impl PluginUnit {
    pub fn instantiate(&self) -> Box<dyn Plugin> {
        (self.factory)(&self.name)
    }
}

impl fmt::Debug for PluginUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginUnit")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Why an entry could not be resolved.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("unknown plugin kind: {0}")]
    UnknownKind(String),
    #[error("invalid manifest: {0}")]
    Manifest(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid plugin name: {0:?}")]
    InvalidName(String),
    #[error("plugin directory is not valid UTF-8")]
    InvalidPath,
    #[error("invalid scan pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("directory scan failed: {0}")]
    Scan(#[from] glob::GlobError),
}

/// A discovery failure, scoped to one entry.
#[derive(Debug)]
pub struct DiscoveryFailure {
    /// Bundled name or manifest path.
    pub location: String,
    pub error: DiscoveryError,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PluginManifest {
    kind: String,
    name: Option<String>,
}

/// Plugin kinds known to this build, plus the discovery sources.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    kinds: BTreeMap<String, PluginFactory>,
    bundled: Vec<String>,
    user_dir: Option<PathBuf>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the plugins shipped with the bot, all bundled.
    pub fn with_builtins() -> Self {
        Self::new()
            .register("auth", |name| Box::new(AuthPlugin::new(name)))
            .register("users", |name| Box::new(UsersPlugin::new(name)))
            .bundle("auth")
            .bundle("users")
    }

    /// Make `kind` constructible.
    pub fn register<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Append a bundled plugin. Its name doubles as its kind.
    pub fn bundle(mut self, name: impl Into<String>) -> Self {
        self.bundled.push(name.into());
        self
    }

    /// Scan `dir` for user plugin manifests after the bundled list.
    pub fn with_user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = Some(dir.into());
        self
    }

    pub fn user_dir(&self) -> Option<&Path> {
        self.user_dir.as_deref()
    }

    /// Resolve every entry, bundled first, then user manifests in file name
    /// order. A missing user directory contributes nothing.
    pub async fn discover(&self) -> Vec<Result<PluginUnit, DiscoveryFailure>> {
        let mut entries: Vec<_> = self
            .bundled
            .iter()
            .map(|name| {
                self.resolve(name, name, PluginOrigin::Bundled)
                    .map_err(|error| DiscoveryFailure {
                        location: name.clone(),
                        error,
                    })
            })
            .collect();

        if let Some(dir) = &self.user_dir {
            entries.extend(self.discover_user(dir).await);
        }
        entries
    }

    async fn discover_user(&self, dir: &Path) -> Vec<Result<PluginUnit, DiscoveryFailure>> {
        if !tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
            debug!(dir = %dir.display(), "No user plugin directory");
            return Vec::new();
        }

        let paths = match manifest_paths(dir) {
            Ok(paths) => paths,
            Err(error) => {
                return vec![Err(DiscoveryFailure {
                    location: dir.display().to_string(),
                    error,
                })];
            }
        };

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let entry = match path {
                Ok(path) => self.load_manifest(&path).await.map_err(|error| DiscoveryFailure {
                    location: path.display().to_string(),
                    error,
                }),
                Err(e) => Err(DiscoveryFailure {
                    location: e.path().display().to_string(),
                    error: e.into(),
                }),
            };
            entries.push(entry);
        }
        entries
    }

    async fn load_manifest(&self, path: &Path) -> Result<PluginUnit, DiscoveryError> {
        let content = tokio::fs::read_to_string(path).await?;
        let manifest: PluginManifest = toml::from_str(&content)?;
        let name = manifest.name.unwrap_or_else(|| manifest.kind.clone());
        self.resolve(&name, &manifest.kind, PluginOrigin::User(path.to_path_buf()))
    }

    fn resolve(
        &self,
        name: &str,
        kind: &str,
        origin: PluginOrigin,
    ) -> Result<PluginUnit, DiscoveryError> {
        if !is_valid_name(name) {
            return Err(DiscoveryError::InvalidName(name.to_string()));
        }
        let factory = self
            .kinds
            .get(kind)
            .ok_or_else(|| DiscoveryError::UnknownKind(kind.to_string()))?;

        Ok(PluginUnit {
            name: name.to_string(),
            kind: kind.to_string(),
            origin,
            factory: Arc::clone(factory),
        })
    }
}

/// Sorted `*.toml` files directly inside `dir`.
fn manifest_paths(dir: &Path) -> Result<Vec<glob::GlobResult>, DiscoveryError> {
    let dir = dir.to_str().ok_or(DiscoveryError::InvalidPath)?;
    let pattern = format!("{}/*.toml", Pattern::escape(dir));
    Ok(glob::glob(&pattern)?.collect())
}

/// Plugin names become config key namespaces.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(':') && !name.chars().any(char::is_whitespace)
}
