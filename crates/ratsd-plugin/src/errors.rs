//! Error types for the ratsd plugin framework

use std::path::PathBuf;

use thiserror::Error;

/// Plugin transport, loader and manager errors
#[derive(Error, Debug)]
pub enum PluginError {
    /// The executable did not answer with a sub-attester handshake. The
    /// loader treats this as a foreign binary and skips it.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("incompatible plugin {path}: expected protocol {expected}, got {got}")]
    IncompatibleVersion {
        path: PathBuf,
        expected: String,
        got: String,
    },

    #[error("plugin {0} did not complete the handshake in time")]
    HandshakeTimeout(PathBuf),

    #[error("failed to spawn plugin {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("plugin {0} not found")]
    NotFound(String),

    #[error("plugin {name:?} provided by two sources: [{first}] and [{second}]")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    #[error("checksum mismatch for plugin {name:?} ({path})")]
    ChecksumMismatch { name: String, path: String },

    #[error("plugin {name:?} ({path}) has no registered checksum")]
    UnregisteredPlugin { name: String, path: String },

    #[error("failed to load sha256 checksum for {name}: {reason}")]
    InvalidChecksum { name: String, reason: String },

    #[error("failed to retrieve sub-attester ID from {path}: {reason}")]
    Identity { path: String, reason: String },

    #[error("this binary is a ratsd plugin and must be launched by ratsd")]
    NotLaunchedByHost,

    #[error("plugin manager has not been initialized")]
    NotInitialized,
}

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::Rpc(err.to_string())
    }
}
