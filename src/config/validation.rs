//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::BotConfig;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.host is required")]
    MissingHost,
    #[error("server.nick is required")]
    MissingNick,
    #[error("server.nick contains invalid character {0:?}")]
    InvalidNick(char),
    #[error("channel name must start with '#' or '&', got '{0}'")]
    InvalidChannel(String),
    #[error("bot.prefix must be a visible character, got {0:?}")]
    InvalidPrefix(char),
    #[error("plugins.user_dir is not a directory: {0}")]
    PluginDirInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &BotConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost);
    }

    let nick = &config.server.nick;
    if nick.is_empty() {
        errors.push(ValidationError::MissingNick);
    } else if let Some(bad) = nick
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, ',' | '*' | '?' | '!' | '@'))
    {
        errors.push(ValidationError::InvalidNick(bad));
    }

    for channel in &config.server.channels {
        if !channel.starts_with(['#', '&']) {
            errors.push(ValidationError::InvalidChannel(channel.clone()));
        }
    }

    let prefix = config.bot.prefix;
    if prefix.is_whitespace() || prefix.is_control() {
        errors.push(ValidationError::InvalidPrefix(prefix));
    }

    // A configured user directory may be absent; it just has to not be a file.
    if let Some(ref dir) = config.plugins.user_dir {
        let path = Path::new(dir);
        if path.exists() && !path.is_dir() {
            errors.push(ValidationError::PluginDirInvalid(dir.display().to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
