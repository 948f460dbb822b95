use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("unknown hook: {0}")]
    UnknownHook(String),

    #[error("invalid hook spec `{0}`")]
    InvalidSpec(String),

    #[error("invalid option `{key}` for hook `{hook}`: {reason}")]
    InvalidOption {
        hook: String,
        key: String,
        reason: String,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}
