use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::FetchError;

static IDENTIFIER_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n,]").expect("static separator pattern"));

/// Splits free-form operator input on commas and newlines, trimming each
/// entry and dropping the empty ones. Duplicates are kept.
pub fn parse_identifiers(raw: &str) -> Vec<String> {
    IDENTIFIER_SEPARATOR
        .split(raw)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Identifiers become file names locally and remotely, so they must stay a single path segment.
fn is_plain_file_stem(identifier: &str) -> bool {
    identifier != "."
        && identifier != ".."
        && !identifier.contains(['/', '\\', '\0'])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    alias: String,
    directory: String,
    identifiers: Vec<String>,
}

impl FetchRequest {
    pub fn new(alias: &str, directory: &str, raw_identifiers: &str) -> Result<Self, FetchError> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(FetchError::MissingField("alias"));
        }
        let directory = directory.trim();
        if directory.is_empty() {
            return Err(FetchError::MissingField("remote directory"));
        }
        if raw_identifiers.trim().is_empty() {
            return Err(FetchError::MissingField("imeis"));
        }
        let identifiers = parse_identifiers(raw_identifiers);
        if identifiers.is_empty() {
            return Err(FetchError::EmptyIdentifiers);
        }
        if let Some(bad) = identifiers.iter().find(|id| !is_plain_file_stem(id)) {
            return Err(FetchError::InvalidIdentifier(bad.clone()));
        }
        Ok(Self {
            alias: alias.to_string(),
            directory: directory.to_string(),
            identifiers,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogExtension {
    Txt,
    Xml,
}

impl LogExtension {
    /// Lookup order. `.txt` wins when both files exist.
    pub const CANDIDATES: [LogExtension; 2] = [LogExtension::Txt, LogExtension::Xml];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogExtension::Txt => "txt",
            LogExtension::Xml => "xml",
        }
    }
}

impl fmt::Display for LogExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn remote_path(directory: &str, identifier: &str, extension: LogExtension) -> String {
    let base = directory.trim_end_matches('/');
    format!("{base}/{identifier}.{extension}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub identifier: String,
    pub remote_path: String,
    pub extension: LogExtension,
}

impl ResolvedFile {
    pub fn new(directory: &str, identifier: &str, extension: LogExtension) -> Self {
        Self {
            identifier: identifier.to_string(),
            remote_path: remote_path(directory, identifier, extension),
            extension,
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.{}", self.identifier, self.extension)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Error,
}

/// One ledger entry of a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    #[serde(rename = "imei")]
    pub identifier: String,
    pub status: ItemStatus,
    #[serde(skip)]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ItemOutcome {
    pub fn success(identifier: &str, payload: String) -> Self {
        Self {
            identifier: identifier.to_string(),
            status: ItemStatus::Success,
            payload: Some(payload),
            reason: None,
        }
    }

    pub fn error(identifier: &str, reason: impl Into<String>) -> Self {
        Self {
            identifier: identifier.to_string(),
            status: ItemStatus::Error,
            payload: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResult {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleResult {
    pub archive: Vec<u8>,
    pub ledger: Vec<ItemOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Single(SingleResult),
    Bundle(BundleResult),
}
