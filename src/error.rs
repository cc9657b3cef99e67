//! Error types shared across the bot.

use crate::config::StoreError;
use crate::db::DbError;
use thiserror::Error;

/// Errors reported by the network client behind [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Client(String),
}

/// Errors opening the bot's stores.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BotError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Db(DbError::Busy) => "db_busy",
            Self::Db(DbError::Constraint(_)) => "db_constraint",
            Self::Db(_) => "db_error",
            Self::Store(_) => "config_store_error",
            Self::Transport(TransportError::NotConnected) => "not_connected",
            Self::Transport(_) => "transport_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(BotError::from(DbError::Busy).error_code(), "db_busy");
        assert_eq!(
            BotError::from(DbError::Constraint("UNIQUE".into())).error_code(),
            "db_constraint"
        );
        assert_eq!(
            BotError::from(TransportError::NotConnected).error_code(),
            "not_connected"
        );
        assert_eq!(
            BotError::from(StoreError::NotAnObject).error_code(),
            "config_store_error"
        );
    }

    #[test]
    fn transparent_display() {
        let err = BotError::from(DbError::Busy);
        assert_eq!(err.to_string(), "database is busy");
    }
}
