//! Error types for the bridge.

use std::path::PathBuf;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid message template: {0}")]
    Template(#[from] TemplateError),
}

/// Rule file persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize rules: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Message template errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown placeholder {{{name}}} at offset {offset}")]
    UnknownPlaceholder { name: String, offset: usize },

    #[error("Unclosed '{{' at offset {offset}")]
    Unclosed { offset: usize },

    #[error("Unmatched '}}' at offset {offset}")]
    UnmatchedClose { offset: usize },
}

/// Outbound transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on adapter {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("No adapter registered under {name}")]
    UnknownAdapter { name: String },

    #[error("Invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Per-destination delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Formatting failed: {0}")]
    Format(#[from] TemplateError),

    #[error("Send failed: {0}")]
    Send(#[from] ChannelError),
}

/// Bridge command errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("Too many arguments for {command}: expected at most {max}")]
    TooManyArguments { command: String, max: usize },
}
