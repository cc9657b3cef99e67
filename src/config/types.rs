//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BotConfig {
    /// Network connection settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Command prefix and data directory.
    #[serde(default)]
    pub bot: BotSettings,
    /// Plugin discovery settings.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Identity store configuration.
    pub database: Option<DatabaseConfig>,
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BotConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Path of the identity database, defaulting to `user.db` in the data directory.
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(db) => PathBuf::from(&db.path),
            None => self.bot.resolved_data_dir().join("user.db"),
        }
    }
}

/// Which network to join, and as whom.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server address (e.g., "irc.libera.chat").
    #[serde(default = "default_host")]
    pub host: String,
    /// Nickname to register with.
    #[serde(default = "default_nick")]
    pub nick: String,
    /// Channels to join after connecting.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            nick: default_nick(),
            channels: Vec::new(),
        }
    }
}

/// Core bot behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct BotSettings {
    /// Character that marks a chat line as a command.
    #[serde(default = "default_prefix")]
    pub prefix: char,
    /// Directory holding `config.json` and the identity database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl BotSettings {
    /// The data directory with relative paths rooted in the home directory.
    /// `config.json`, `user.db` and the default plugin directory live here.
    pub fn resolved_data_dir(&self) -> PathBuf {
        resolve_home_relative(&self.data_dir)
    }
}

/// Root a relative path in `$HOME`. Absolute paths are returned unchanged.
pub fn resolve_home_relative(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(path)
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            data_dir: default_data_dir(),
        }
    }
}

/// Plugin discovery configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PluginsConfig {
    /// Directory of user plugin manifests (`*.toml`). Defaults to
    /// `<data_dir>/plugins` when unset.
    pub user_dir: Option<PathBuf>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    pub path: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_nick() -> String {
    "PurpleBot".to_string()
}

fn default_prefix() -> char {
    '.'
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".purplebot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_data_dir_is_resolved_once_for_every_store() {
        let config: BotConfig = toml::from_str("[bot]\ndata_dir = \"pbdata\"\n").unwrap();
        let data_dir = config.bot.resolved_data_dir();

        assert!(data_dir.is_absolute() || std::env::var_os("HOME").is_none());
        assert!(data_dir.ends_with("pbdata"));
        assert_eq!(config.database_path(), data_dir.join("user.db"));
        assert_eq!(
            crate::config::FileConfig::new(&config.bot.data_dir).dir(),
            data_dir
        );
    }

    #[test]
    fn absolute_data_dir_is_kept() {
        let config: BotConfig = toml::from_str("[bot]\ndata_dir = \"/srv/purple\"\n").unwrap();
        assert_eq!(config.bot.resolved_data_dir(), PathBuf::from("/srv/purple"));
        assert_eq!(config.database_path(), PathBuf::from("/srv/purple/user.db"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: BotConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.nick, "PurpleBot");
        assert!(config.server.channels.is_empty());
        assert_eq!(config.bot.prefix, '.');
        assert!(config.bot.data_dir.ends_with(".purplebot"));
        assert!(config.plugins.user_dir.is_none());
        assert!(config.database.is_none());
    }

    #[test]
    fn full_file_parses() {
        let config: BotConfig = toml::from_str(
            r##"
            [server]
            host = "irc.example.net"
            nick = "violet"
            channels = ["#purple", "#bots"]

            [bot]
            prefix = "!"
            data_dir = "/var/lib/purplebot"

            [plugins]
            user_dir = "/etc/purplebot/plugins"

            [database]
            path = ":memory:"
            "##,
        )
        .unwrap();

        assert_eq!(config.server.host, "irc.example.net");
        assert_eq!(config.server.channels, vec!["#purple", "#bots"]);
        assert_eq!(config.bot.prefix, '!');
        assert_eq!(
            config.plugins.user_dir.as_deref(),
            Some(Path::new("/etc/purplebot/plugins"))
        );
        assert_eq!(config.database_path(), PathBuf::from(":memory:"));
    }

    #[test]
    fn database_defaults_into_data_dir() {
        let config: BotConfig = toml::from_str("[bot]\ndata_dir = \"/tmp/pb\"\n").unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/pb/user.db"));
    }

    #[test]
    fn multi_char_prefix_is_rejected() {
        assert!(toml::from_str::<BotConfig>("[bot]\nprefix = \"!!\"\n").is_err());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = BotConfig::load("/nonexistent/purplebot.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
