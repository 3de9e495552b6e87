use std::path::PathBuf;

/// Core error type for railwatch.
///
/// Adapter crates map their provider errors into `External` so the monitor can
/// treat every collaborator failure the same way.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid command {input:?}: {reason}")]
    InvalidCommand { input: String, reason: String },

    #[error("store error: {path}: {reason}")]
    Store { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub(crate) fn invalid_command(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
