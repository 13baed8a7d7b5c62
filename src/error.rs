//! Error types for packaging operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the packaging workflow and its collaborators
#[derive(Debug, Error)]
pub enum PackagerError {
    /// Missing environment value, bad argument, unknown operation
    #[error("configuration error: {0}")]
    Config(String),

    /// Model (or one of its files) is unknown to the hub
    #[error("model lookup failed for '{model_id}': {message}")]
    Lookup { model_id: String, message: String },

    /// Local filesystem failure
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Weight file could not be read or converted
    #[error("weight conversion failed for {path:?}: {message}")]
    Conversion { path: PathBuf, message: String },

    /// Object store or inference platform rejected the call
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
}

impl PackagerError {
    pub fn config(message: impl Into<String>) -> Self {
        PackagerError::Config(message.into())
    }

    pub fn lookup(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        PackagerError::Lookup {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackagerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(service: &'static str, message: impl ToString) -> Self {
        PackagerError::Transport {
            service,
            message: message.to_string(),
        }
    }

    /// True for errors in the configuration class
    pub fn is_config(&self) -> bool {
        matches!(self, PackagerError::Config(_))
    }
}

pub type PackagerResult<T> = Result<T, PackagerError>;
