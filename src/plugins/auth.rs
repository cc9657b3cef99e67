//! NickServ authentication on connect.

use super::Plugin;
use crate::bot::Bot;
use crate::bus::{Event, Listener};
use crate::config::{ConfigStore, ConfigStoreExt, plugin_key};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

const NICKSERV: &str = "NickServ";

/// `<name>:nick` and `<name>:pass`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub nick: Option<String>,
    pub pass: Option<String>,
}

impl AuthSettings {
    pub async fn read(config: &dyn ConfigStore, name: &str) -> anyhow::Result<Self> {
        Ok(Self {
            nick: config.get_as(&plugin_key(name, "nick")).await?,
            pass: config.get_as(&plugin_key(name, "pass")).await?,
        })
    }
}

/// Claims the configured nick once the bot is connected.
pub struct AuthPlugin {
    name: String,
}

impl AuthPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Plugin for AuthPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&mut self, bot: &Arc<Bot>) -> anyhow::Result<()> {
        bot.bus().listen(
            self.name.clone(),
            AuthListener {
                name: self.name.clone(),
                bot: Arc::downgrade(bot),
            },
        );
        Ok(())
    }
}

struct AuthListener {
    name: String,
    bot: Weak<Bot>,
}

#[async_trait]
impl Listener for AuthListener {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        if !matches!(event, Event::Connected { .. }) {
            return Ok(());
        }
        let Some(bot) = self.bot.upgrade() else {
            return Ok(());
        };

        let settings = AuthSettings::read(bot.config().as_ref(), &self.name).await?;
        let Some(nick) = settings.nick else {
            debug!(plugin = %self.name, "No nick configured");
            return Ok(());
        };

        if let Some(pass) = &settings.pass {
            bot.say(NICKSERV, &format!("GHOST {} {}", nick, pass)).await?;
        }
        bot.set_nick(&nick).await?;
        if let Some(pass) = &settings.pass {
            bot.say(NICKSERV, &format!("IDENTIFY {}", pass)).await?;
        }

        info!(plugin = %self.name, nick = %nick, identified = settings.pass.is_some(), "Nick claimed");
        Ok(())
    }
}
