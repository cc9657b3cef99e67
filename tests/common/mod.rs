//! Integration test common infrastructure.
//!
//! Provides a transport that records what the bot asked it to do, and a
//! helper for building a bot over in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use purplebot::config::MemoryConfig;
use purplebot::db::Database;
use purplebot::{Bot, BotOptions, Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// One call made on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect(Option<String>),
    Join(String),
    Part(String, Option<String>),
    Say(String, String),
    Nick(String),
}

impl Action {
    pub fn say(target: &str, text: &str) -> Self {
        Self::Say(target.to_string(), text.to_string())
    }
}

/// Transport that records every action in order.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    actions: Mutex<Vec<Action>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().clone()
    }

    /// Messages sent with `say`, as `(target, text)`.
    pub fn said(&self) -> Vec<(String, String)> {
        self.actions
            .lock()
            .iter()
            .filter_map(|a| match a {
                Action::Say(target, text) => Some((target.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` actions were recorded.
    pub async fn wait_for(&self, count: usize) -> anyhow::Result<Vec<Action>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let actions = self.actions();
            if actions.len() >= count {
                return Ok(actions);
            }
            if Instant::now() >= deadline {
                anyhow::bail!("timed out waiting for {} actions, got {:?}", count, actions);
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    fn record(&self, action: Action) -> Result<(), TransportError> {
        self.actions.lock().push(action);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.record(Action::Connect)
    }

    async fn disconnect(&self, reason: Option<&str>) -> Result<(), TransportError> {
        self.record(Action::Disconnect(reason.map(String::from)))
    }

    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.record(Action::Join(channel.to_string()))
    }

    async fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), TransportError> {
        self.record(Action::Part(channel.to_string(), reason.map(String::from)))
    }

    async fn say(&self, target: &str, text: &str) -> Result<(), TransportError> {
        self.record(Action::say(target, text))
    }

    async fn set_nick(&self, nick: &str) -> Result<(), TransportError> {
        self.record(Action::Nick(nick.to_string()))
    }
}

/// A bot over a fresh in-memory config store and identity database.
pub struct TestBot {
    pub bot: Arc<Bot>,
    pub transport: Arc<RecordingTransport>,
    pub config: Arc<MemoryConfig>,
}

impl TestBot {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_options(BotOptions::default()).await
    }

    pub async fn with_options(options: BotOptions) -> anyhow::Result<Self> {
        let db = Database::new(":memory:").await?;
        let transport = RecordingTransport::new();
        let config = Arc::new(MemoryConfig::new());
        let bot = Bot::new(
            options,
            config.clone(),
            Arc::new(db.users()),
            transport.clone(),
        );
        Ok(Self {
            bot,
            transport,
            config,
        })
    }
}
