//! The bot: glue between the network client, the bus, the stores and plugins.

use crate::bus::{
    ClientEvent, ClientEventKind, CommandEvent, DEFAULT_PREFIX, Event, EventBus, ForwardedEvent,
    Subscription, forward_target, parse_command,
};
use crate::config::{BotConfig, ConfigStore, FileConfig};
use crate::db::{Database, UserDatabase};
use crate::error::{BotError, TransportError};
use crate::plugins::{Plugin, PluginManager, PluginRegistry, ResetError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Outbound side of the network client.
///
/// The wire protocol lives behind this trait; the bot only asks for actions
/// and feeds the client's events back through [`Bot::handle_client_event`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn disconnect(&self, reason: Option<&str>) -> Result<(), TransportError>;
    async fn join(&self, channel: &str) -> Result<(), TransportError>;
    async fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), TransportError>;
    async fn say(&self, target: &str, text: &str) -> Result<(), TransportError>;
    async fn set_nick(&self, nick: &str) -> Result<(), TransportError>;
}

/// Transport that only logs what it is asked to do.
#[derive(Debug, Default)]
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        info!("connect");
        Ok(())
    }

    async fn disconnect(&self, reason: Option<&str>) -> Result<(), TransportError> {
        info!(reason = ?reason, "disconnect");
        Ok(())
    }

    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        info!(channel = %channel, "join");
        Ok(())
    }

    async fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), TransportError> {
        info!(channel = %channel, reason = ?reason, "part");
        Ok(())
    }

    async fn say(&self, target: &str, text: &str) -> Result<(), TransportError> {
        info!(target = %target, text = %text, "say");
        Ok(())
    }

    async fn set_nick(&self, nick: &str) -> Result<(), TransportError> {
        info!(nick = %nick, "nick");
        Ok(())
    }
}

/// Bot construction options.
#[derive(Debug, Clone)]
pub struct BotOptions {
    pub server: String,
    pub nick: String,
    pub channels: Vec<String>,
    pub prefix: char,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            nick: "PurpleBot".to_string(),
            channels: Vec::new(),
            prefix: DEFAULT_PREFIX,
        }
    }
}

impl From<&BotConfig> for BotOptions {
    fn from(config: &BotConfig) -> Self {
        Self {
            server: config.server.host.clone(),
            nick: config.server.nick.clone(),
            channels: config.server.channels.clone(),
            prefix: config.bot.prefix,
        }
    }
}

/// A configured bot. Shared as `Arc<Bot>` with every plugin.
pub struct Bot {
    options: BotOptions,
    nick: RwLock<String>,
    bus: EventBus,
    config: Arc<dyn ConfigStore>,
    users: UserDatabase,
    transport: Arc<dyn Transport>,
    plugins: PluginManager,
}

impl Bot {
    pub fn new(
        options: BotOptions,
        config: Arc<dyn ConfigStore>,
        users: UserDatabase,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            nick: RwLock::new(options.nick.clone()),
            options,
            bus: EventBus::new(),
            config,
            users,
            transport,
            plugins: PluginManager::new(),
        })
    }

    /// Open the config store and identity database named by `config`.
    pub async fn open(
        config: &BotConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>, BotError> {
        let store = FileConfig::open(config.bot.resolved_data_dir()).await?;
        let db_path = config.database_path();
        let db = Database::new(&db_path.to_string_lossy()).await?;

        Ok(Self::new(
            BotOptions::from(config),
            Arc::new(store),
            Arc::new(db.users()),
            transport,
        ))
    }

    pub fn server(&self) -> &str {
        &self.options.server
    }

    /// Current nickname.
    pub fn nick(&self) -> String {
        self.nick.read().clone()
    }

    pub fn prefix(&self) -> char {
        self.options.prefix
    }

    /// Channels joined on connect.
    pub fn channels(&self) -> &[String] {
        &self.options.channels
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn publish(&self, event: Event) -> usize {
        self.bus.publish(event)
    }

    /// Publish a plugin-defined notification.
    pub fn emit<I, S>(&self, source: &str, name: &str, args: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bus.publish(Event::Plugin {
            source: source.to_string(),
            name: name.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// Runtime key/value configuration.
    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }

    /// Identity store.
    pub fn users(&self) -> &UserDatabase {
        &self.users
    }

    /// Feed one event from the network client into the bot.
    ///
    /// A chat message that parses as a command is published as
    /// [`Event::Command`] first; forwarded events follow in table order.
    pub fn handle_client_event(&self, event: ClientEvent) {
        if let Some(context) = event.context()
            && let Some(cmd) = parse_command(&context.text, self.prefix())
        {
            debug!(command = %cmd.name, nick = %context.nick, to = %context.to, "Command parsed");
            self.bus.publish(Event::Command(CommandEvent {
                context: Arc::new(context),
                name: cmd.name,
                args: cmd.args,
            }));
        }

        if event.kind == ClientEventKind::Nick
            && let [old, new, ..] = event.args.as_slice()
        {
            let mut nick = self.nick.write();
            if *nick == *old {
                *nick = new.clone();
            }
        }

        if let Some(kind) = forward_target(event.kind) {
            self.bus.publish(Event::Forwarded(ForwardedEvent {
                kind,
                args: event.args,
                message: event.message,
            }));
        }
    }

    /// Connect, then join the configured channels.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await?;
        info!(server = %self.server(), "Connected");
        self.bus.publish(Event::Connected {
            server: self.server().to_string(),
        });

        for channel in &self.options.channels {
            self.join(channel).await?;
        }
        Ok(())
    }

    pub async fn disconnect(&self, reason: Option<&str>) -> Result<(), TransportError> {
        self.transport.disconnect(reason).await?;
        info!(server = %self.server(), reason = ?reason, "Disconnected");
        self.bus.publish(Event::Disconnected {
            server: self.server().to_string(),
            reason: reason.map(String::from),
        });
        Ok(())
    }

    pub async fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.transport.join(channel).await?;
        self.bus.publish(Event::Joined {
            channel: channel.to_string(),
        });
        Ok(())
    }

    pub async fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), TransportError> {
        self.transport.part(channel, reason).await?;
        self.bus.publish(Event::Parted {
            channel: channel.to_string(),
            reason: reason.map(String::from),
        });
        Ok(())
    }

    pub async fn say(&self, target: &str, text: &str) -> Result<(), TransportError> {
        self.transport.say(target, text).await
    }

    pub async fn set_nick(&self, nick: &str) -> Result<(), TransportError> {
        self.transport.set_nick(nick).await?;
        *self.nick.write() = nick.to_string();
        Ok(())
    }

    /// Run the plugin load pass. Returns the number of active plugins.
    pub async fn load_plugins(self: &Arc<Self>, registry: &PluginRegistry) -> usize {
        self.plugins.load_all(self, registry).await
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// First active plugin registered under `name`.
    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name)
    }

    /// Reset every active plugin.
    pub async fn reset_plugins(&self) -> Result<(), ResetError> {
        self.plugins.reset_all().await
    }
}

impl fmt::Display for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PurpleBot: {}]", self.server())
    }
}

/// Build a bot and run the plugin load pass.
pub async fn init(
    options: BotOptions,
    config: Arc<dyn ConfigStore>,
    users: UserDatabase,
    transport: Arc<dyn Transport>,
    registry: &PluginRegistry,
) -> Arc<Bot> {
    let bot = Bot::new(options, config, users, transport);
    bot.load_plugins(registry).await;
    bot
}
