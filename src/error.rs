//! Error types shared across the explorer core.
//!
//! Every subsystem gets its own enum so callers can match on exactly the
//! conditions that subsystem can produce. The binary wraps all of them into
//! `color_eyre` reports; the library never terminates the process itself.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the wire transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection handshake did not complete
    #[error("Connection failed: {0}")]
    Connect(String),

    /// An established link dropped unexpectedly
    #[error("Link lost: {0}")]
    LinkLost(String),

    /// The client refused to queue a request (publish, subscribe, disconnect)
    #[error("Request rejected: {0}")]
    Request(String),
}

/// Failures of a broker session's lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Initial connect failed; the session is left in the Failed state
    #[error("Could not connect to {address}:{port}: {source}")]
    Connect {
        address: String,
        port: u16,
        #[source]
        source: TransportError,
    },

    /// Reconnect attempts after a link loss hit the ceiling
    #[error("Giving up after {attempts} failed reconnect attempts")]
    RetryExhausted { attempts: u32 },

    /// The session task ended abnormally
    #[error("Session task failed: {0}")]
    Task(String),
}

/// Failures of a publish request.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("No active broker session")]
    NotConnected,

    #[error("Topic must not be empty")]
    EmptyTopic,

    #[error("Payload must not be empty")]
    EmptyPayload,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("No topic provided, reset the filter to receive all topics")]
    EmptyFilter,
}

/// Failures of the tree export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Directory {0} is not empty")]
    DirectoryNotEmpty(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of widget management and widget interactions.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Dashboard is full ({0} widgets)")]
    Full(usize),

    #[error("Widget name must not be empty")]
    EmptyName,

    #[error("A widget named '{0}' already exists")]
    DuplicateName(String),

    #[error("No widget named '{0}'")]
    UnknownWidget(String),

    #[error("Widget '{0}' is not a {1} widget")]
    WrongKind(String, &'static str),

    #[error("Message can't be empty")]
    EmptyMessage,

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Failures loading or storing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
