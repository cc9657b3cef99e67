//! Runtime key/value configuration store.
//!
//! Keys are namespaced `<plugin>:<option>`. The only key the core itself
//! touches is `<plugin>:enabled`; plugins read their own options through
//! [`ConfigStoreExt::get_as`] into typed settings.

use super::types::resolve_home_relative;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Config store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config store JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config file root must be an object")]
    NotAnObject,
    #[error("invalid value for {key}: {source}")]
    InvalidValue {
        key: String,
        source: serde_json::Error,
    },
}

/// Namespaced async key/value store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store `value` under `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Typed helpers over any [`ConfigStore`].
#[async_trait]
pub trait ConfigStoreExt: ConfigStore {
    /// Fetch and deserialize the value under `key`.
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::InvalidValue {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Serialize and store `value` under `key`.
    async fn set_as<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }
}

impl<S: ConfigStore + ?Sized> ConfigStoreExt for S {}

/// Build the namespaced key for a plugin option.
pub fn plugin_key(plugin: &str, option: &str) -> String {
    format!("{}:{}", plugin, option)
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: DashMap<String, Value>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfig {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store persisted as `config.json` inside a config directory.
///
/// Every `set` is flushed to disk immediately so flags such as
/// `<plugin>:enabled` survive restarts.
#[derive(Debug)]
pub struct FileConfig {
    dir: PathBuf,
    values: tokio::sync::Mutex<Map<String, Value>>,
}

impl FileConfig {
    /// Open (without reading) a config directory. Relative paths are rooted
    /// in the home directory.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = resolve_home_relative(dir.as_ref());
        Self {
            dir,
            values: tokio::sync::Mutex::new(Map::new()),
        }
    }

    /// Open a config directory and load its `config.json` if present.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let config = Self::new(dir);
        config.ensure_dir().await?;
        if tokio::fs::try_exists(config.config_path()).await? {
            config.sync().await?;
        }
        Ok(config)
    }

    /// Create a fresh, uniquely named config directory under the system temp dir.
    pub async fn temp() -> Result<Self, StoreError> {
        let id = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "purplebot-{}-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_micros(),
            id
        ));
        let config = Self::new(dir);
        config.ensure_dir().await?;
        Ok(config)
    }

    /// The config directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A path rooted in the config directory.
    pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }

    /// Location of the backing JSON file.
    pub fn config_path(&self) -> PathBuf {
        self.path("config.json")
    }

    /// Whether the config directory exists.
    pub async fn has_dir(&self) -> bool {
        tokio::fs::metadata(&self.dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the config directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Delete the config directory and everything in it.
    pub async fn remove_dir(&self) -> Result<(), StoreError> {
        tokio::fs::remove_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Reload values from disk, replacing what is in memory.
    pub async fn sync(&self) -> Result<(), StoreError> {
        let content = tokio::fs::read_to_string(self.config_path()).await?;
        let Value::Object(map) = serde_json::from_str::<Value>(&content)? else {
            return Err(StoreError::NotAnObject);
        };
        *self.values.lock().await = map;
        debug!(path = %self.config_path().display(), "Config loaded");
        Ok(())
    }

    /// Write the in-memory values to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let values = self.values.lock().await;
        self.write(&values).await
    }

    async fn write(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(values)?;
        tokio::fs::write(self.config_path(), content).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileConfig {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        // Written under the lock so concurrent sets land on disk in order.
        self.write(&values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Greeting {
        text: String,
        times: u32,
    }

    #[tokio::test]
    async fn memory_get_set() {
        let config = MemoryConfig::new();
        assert_eq!(config.get("auth:enabled").await.unwrap(), None);

        config.set("auth:enabled", json!(false)).await.unwrap();
        assert_eq!(config.get("auth:enabled").await.unwrap(), Some(json!(false)));
    }

    #[tokio::test]
    async fn typed_values() {
        let config = MemoryConfig::new();
        let greeting = Greeting {
            text: "hi".to_string(),
            times: 2,
        };
        config.set_as("greet:message", &greeting).await.unwrap();

        let loaded: Option<Greeting> = config.get_as("greet:message").await.unwrap();
        assert_eq!(loaded, Some(greeting));

        let missing: Option<Greeting> = config.get_as("greet:other").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn typed_mismatch_names_the_key() {
        let config = MemoryConfig::new();
        config.set("auth:nick", json!(42)).await.unwrap();

        let err = config.get_as::<String>("auth:nick").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { ref key, .. } if key == "auth:nick"));
    }

    #[tokio::test]
    async fn file_config_persists_across_instances() {
        let config = FileConfig::temp().await.unwrap();
        assert!(config.has_dir().await);
        config.set("url:enabled", json!(true)).await.unwrap();

        let reopened = FileConfig::open(config.dir()).await.unwrap();
        assert_eq!(reopened.get("url:enabled").await.unwrap(), Some(json!(true)));

        config.remove_dir().await.unwrap();
        assert!(!config.has_dir().await);
    }

    #[tokio::test]
    async fn file_config_rejects_non_object_root() {
        let config = FileConfig::temp().await.unwrap();
        tokio::fs::write(config.config_path(), "[1, 2]").await.unwrap();

        assert!(matches!(config.sync().await, Err(StoreError::NotAnObject)));
        config.remove_dir().await.unwrap();
    }

    #[test]
    fn relative_dirs_are_rooted_in_home() {
        let config = FileConfig::new(".purplebot-test");
        assert!(config.dir().is_absolute() || std::env::var_os("HOME").is_none());
        assert!(config.config_path().ends_with(".purplebot-test/config.json"));
    }

    #[test]
    fn plugin_keys_are_namespaced() {
        assert_eq!(plugin_key("karma", "enabled"), "karma:enabled");
    }
}
