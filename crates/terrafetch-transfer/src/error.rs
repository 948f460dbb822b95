use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("authentication failed (HTTP 401)")]
    AuthFailed,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("incomplete download: {got}/{expected} bytes")]
    Incomplete { got: u64, expected: u64 },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("maximum attempts exhausted ({tries})")]
    MaxRetriesExceeded { tries: u32 },

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("FTP error: {0}")]
    Ftp(#[source] suppaftp::FtpError),

    #[error("missing local file: {0}")]
    MissingLocal(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        TransferError::Network(e)
    }
}

impl From<suppaftp::FtpError> for TransferError {
    fn from(e: suppaftp::FtpError) -> Self {
        TransferError::Ftp(e)
    }
}
