use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{FetchResult, ItemOutcome};
use crate::error::FetchError;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_ZIP: &str = "application/zip";
pub const BUNDLE_FILENAME: &str = "logs.zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Inline,
    Attachment,
}

/// Transport-agnostic response: what an HTTP layer would put in
/// `Content-Type`, `Content-Disposition` and the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub content_type: &'static str,
    pub disposition: Disposition,
    pub filename: String,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn content_disposition(&self) -> String {
        let kind = match self.disposition {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        };
        format!("{kind}; filename=\"{}\"", self.filename)
    }
}

impl From<FetchResult> for FetchResponse {
    fn from(result: FetchResult) -> Self {
        match result {
            FetchResult::Single(single) => FetchResponse {
                content_type: TEXT_PLAIN,
                disposition: Disposition::Inline,
                filename: single.filename,
                body: single.content.into_bytes(),
            },
            FetchResult::Bundle(bundle) => FetchResponse {
                content_type: APPLICATION_ZIP,
                disposition: Disposition::Attachment,
                filename: BUNDLE_FILENAME.to_string(),
                body: bundle.archive,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ItemOutcome>>,
}

impl From<&FetchError> for ErrorPayload {
    fn from(err: &FetchError) -> Self {
        let message = match err {
            FetchError::NoFilesFound { .. } => {
                "No files found or all files were empty or too large".to_string()
            }
            other => other.to_string(),
        };
        let files = match err {
            FetchError::NoFilesFound { ledger } => Some(ledger.clone()),
            _ => None,
        };
        ErrorPayload {
            message,
            kind: err.kind(),
            error: err.detail().map(str::to_string),
            files,
        }
    }
}

/// Writes the response body to `dir/<filename>` via a temp file in the same directory.
pub fn write_response(dir: &Utf8Path, response: &FetchResponse) -> Result<Utf8PathBuf, FetchError> {
    std::fs::create_dir_all(dir.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("create {dir}: {err}")))?;
    let dest = dir.join(&response.filename);

    let mut temp = tempfile::Builder::new()
        .prefix("logfetch-out")
        .tempfile_in(dir.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    temp.write_all(&response.body)
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    Ok(dest)
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_error(err: &FetchError) -> io::Result<()> {
        Self::print_json(&ErrorPayload::from(err))
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
