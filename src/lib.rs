//! purplebot - a chat-bot core.
//!
//! Turns protocol events from an external chat client into bus events and
//! commands, drives pluggable behavior modules, and resolves live identities
//! to persisted accounts for authorization.

pub mod bot;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod plugins;
pub mod telemetry;

pub use bot::{Bot, BotOptions, NullTransport, Transport, init};
pub use error::{BotError, TransportError};
