use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::ItemOutcome;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("no device identifiers given")]
    EmptyIdentifiers,

    #[error("invalid device identifier: {0}")]
    InvalidIdentifier(String),

    #[error("given bench {0} does not exist")]
    #[diagnostic(help("run `logfetch hosts` to list configured aliases"))]
    AliasNotFound(String),

    #[error("remote connection failed: {0}")]
    Transport(String),

    #[error("remote command reported: {0}")]
    RemoteStderr(String),

    #[error("file for given imei: {identifier} does not exist")]
    NotFound { identifier: String },

    #[error("failed to fetch file for IMEI {identifier}")]
    FetchFailure { identifier: String, reason: String },

    #[error("no files found or all files were empty or too large")]
    NoFilesFound { ledger: Vec<ItemOutcome> },

    #[error("failed to build archive: {0}")]
    Archive(String),

    #[error("missing config file logfetch.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::MissingField(_)
            | FetchError::EmptyIdentifiers
            | FetchError::InvalidIdentifier(_) => "validation",
            FetchError::AliasNotFound(_) => "alias_not_found",
            FetchError::Transport(_) => "transport",
            FetchError::RemoteStderr(_) => "remote_stderr",
            FetchError::NotFound { .. } => "not_found",
            FetchError::FetchFailure { .. } => "fetch_failure",
            FetchError::NoFilesFound { .. } => "no_files_found",
            FetchError::Archive(_) => "archive",
            FetchError::MissingConfig | FetchError::ConfigRead(_) | FetchError::ConfigParse(_) => {
                "config"
            }
            FetchError::Filesystem(_) => "filesystem",
        }
    }

    /// Underlying technical reason, when the failure carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            FetchError::Transport(reason)
            | FetchError::RemoteStderr(reason)
            | FetchError::Archive(reason)
            | FetchError::ConfigParse(reason)
            | FetchError::Filesystem(reason) => Some(reason),
            FetchError::FetchFailure { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
