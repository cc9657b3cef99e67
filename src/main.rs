//! purplebot - chat-bot core runner.

use purplebot::config::{BotConfig, validate};
use purplebot::plugins::PluginRegistry;
use purplebot::{Bot, NullTransport, telemetry};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        BotConfig::load(&config_path).map_err(|e| {
            error!(path = %config_path, error = %e, "Failed to load config");
            e
        })?
    } else {
        info!(path = %config_path, "No config file, using defaults");
        BotConfig::default()
    };

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }

    info!(
        server = %config.server.host,
        nick = %config.server.nick,
        data_dir = %config.bot.resolved_data_dir().display(),
        "Starting purplebot"
    );

    let bot = Bot::open(&config, Arc::new(NullTransport)).await.map_err(|e| {
        error!(code = e.error_code(), error = %e, "Failed to open bot stores");
        e
    })?;

    let user_dir = config
        .plugins
        .user_dir
        .clone()
        .unwrap_or_else(|| config.bot.resolved_data_dir().join("plugins"));
    let registry = PluginRegistry::with_builtins().with_user_dir(user_dir);
    let loaded = bot.load_plugins(&registry).await;
    info!(count = loaded, plugins = ?bot.plugins().names(), "Plugins loaded");

    bot.connect().await?;
    info!("{} ready", bot);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    bot.disconnect(Some("Shutting down")).await?;

    Ok(())
}
