//! Account management commands.
//!
//! `whoami` is open to everyone; `adduser` and `deluser` require the caller to
//! resolve to exactly one admin account.

use super::Plugin;
use crate::bot::Bot;
use crate::bus::{CommandEvent, Event, Listener};
use crate::config::{ConfigStore, ConfigStoreExt, plugin_key};
use crate::db::{DbError, Hostmask, User, UserDatabase};
use crate::telemetry::spans;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{Instrument, info, warn};

/// Account name given to the bootstrap admin.
pub const OWNER: &str = "owner";

/// `<name>:owner`, a `nick!user@host` mask for the bootstrap admin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersSettings {
    pub owner: Option<String>,
}

impl UsersSettings {
    pub async fn read(config: &dyn ConfigStore, name: &str) -> anyhow::Result<Self> {
        Ok(Self {
            owner: config.get_as(&plugin_key(name, "owner")).await?,
        })
    }
}

pub struct UsersPlugin {
    name: String,
    users: Option<UserDatabase>,
}

impl UsersPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            users: None,
        }
    }
}

#[async_trait]
impl Plugin for UsersPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&mut self, bot: &Arc<Bot>) -> anyhow::Result<()> {
        let users = Arc::clone(bot.users());
        let settings = UsersSettings::read(bot.config().as_ref(), &self.name).await?;
        if let Some(mask) = settings.owner {
            ensure_owner(&users, &mask).await?;
        }

        bot.bus().listen(
            self.name.clone(),
            UsersListener {
                bot: Arc::downgrade(bot),
            },
        );
        self.users = Some(users);
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        if let Some(users) = &self.users {
            users.clear().await?;
        }
        Ok(())
    }
}

/// Create the owner account unless it already exists.
async fn ensure_owner(users: &UserDatabase, mask: &str) -> Result<(), DbError> {
    if users.find_user_by_name(OWNER).await?.is_some() {
        return Ok(());
    }

    let mut owner = User {
        admin: true,
        ..User::named(OWNER)
    };
    let id = users.set_user(&mut owner).await?;
    let mut hostmask = Hostmask::parse(id, mask);
    if let Err(e) = users.set_hostmask(&mut hostmask).await {
        users.delete_user(&id).await?;
        return Err(e);
    }

    info!(mask = %hostmask, "Owner account created");
    Ok(())
}

struct UsersListener {
    bot: Weak<Bot>,
}

#[async_trait]
impl Listener for UsersListener {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        let Some(cmd) = event.as_command() else {
            return Ok(());
        };
        if !matches!(cmd.name.as_str(), "whoami" | "adduser" | "deluser") {
            return Ok(());
        }
        let Some(bot) = self.bot.upgrade() else {
            return Ok(());
        };

        let span = spans::command(&cmd.name, &cmd.context.nick, Some(&cmd.context.to));
        let reply = async {
            match cmd.name.as_str() {
                "whoami" => whoami(bot.users(), cmd).await,
                "adduser" => adduser(bot.users(), cmd).await,
                _ => deluser(bot.users(), cmd).await,
            }
        }
        .instrument(span)
        .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) if e.is_transient() => "The user database is busy, try again.".to_string(),
            Err(e) => return Err(e.into()),
        };
        bot.say(cmd.context.reply_target(), &reply).await?;
        Ok(())
    }
}

fn label(user: &User) -> String {
    match (&user.name, user.id) {
        (Some(name), _) => name.clone(),
        (None, Some(id)) => format!("user #{}", id),
        (None, None) => "an unsaved user".to_string(),
    }
}

async fn whoami(users: &UserDatabase, cmd: &CommandEvent) -> Result<String, DbError> {
    let ctx = &cmd.context;
    let matches = users
        .match_users_hostmask(&ctx.nick, &ctx.username, &ctx.hostname)
        .await?;

    Ok(match matches.as_slice() {
        [] => format!("I don't know you, {}.", ctx.nick),
        [user] if user.admin => format!("You are {} (admin).", label(user)),
        [user] => format!("You are {}.", label(user)),
        several => format!("You match {} users.", several.len()),
    })
}

async fn adduser(users: &UserDatabase, cmd: &CommandEvent) -> Result<String, DbError> {
    let [name, mask] = cmd.args.as_slice() else {
        return Ok("Usage: adduser <name> <nick!user@host>".to_string());
    };
    if !users.has_admin(&*cmd.context).await? {
        warn!(nick = %cmd.context.nick, command = "adduser", "Permission denied");
        return Ok("Permission denied.".to_string());
    }

    let mut user = User::named(name.as_str());
    let id = match users.set_user(&mut user).await {
        Ok(id) => id,
        Err(e) if e.is_constraint() => return Ok(format!("User {} already exists.", name)),
        Err(e) => return Err(e),
    };

    let mut hostmask = Hostmask::parse(id, mask);
    match users.set_hostmask(&mut hostmask).await {
        Ok(_) => {
            info!(user = %name, mask = %hostmask, "User added");
            Ok(format!("Added {} ({}).", name, hostmask))
        }
        Err(e) => {
            users.delete_user(&id).await?;
            if e.is_constraint() {
                Ok(format!("Hostmask {} is already in use.", hostmask))
            } else {
                Err(e)
            }
        }
    }
}

async fn deluser(users: &UserDatabase, cmd: &CommandEvent) -> Result<String, DbError> {
    let [name] = cmd.args.as_slice() else {
        return Ok("Usage: deluser <name>".to_string());
    };
    if !users.has_admin(&*cmd.context).await? {
        warn!(nick = %cmd.context.nick, command = "deluser", "Permission denied");
        return Ok("Permission denied.".to_string());
    }

    match users.find_user_by_name(name).await? {
        Some(user) => {
            users.delete_user(&user).await?;
            info!(user = %name, "User deleted");
            Ok(format!("Deleted {}.", name))
        }
        None => Ok(format!("No such user: {}.", name)),
    }
}
