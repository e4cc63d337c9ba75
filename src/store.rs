use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::LogSink;
use crate::error::FetchError;

const ACTIVITY_FILE: &str = "activity.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only operator activity log, one JSON object per line.
#[derive(Debug, Clone)]
pub struct ActivityStore {
    path: Utf8PathBuf,
}

impl ActivityStore {
    pub fn new() -> Result<Self, FetchError> {
        let data_dir = ProjectDirs::from("", "", "logfetch")
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
            .ok_or_else(|| {
                FetchError::Filesystem("unable to resolve data directory".to_string())
            })?;
        Ok(Self {
            path: data_dir.join(ACTIVITY_FILE),
        })
    }

    pub fn new_with_path(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> Result<ActivityEntry, FetchError> {
        if message.trim().is_empty() {
            return Err(FetchError::MissingField("message"));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        }

        let entry = ActivityEntry {
            message: message.to_string(),
            created_at: Utc::now(),
        };
        let mut line =
            serde_json::to_vec(&entry).map_err(|err| FetchError::Filesystem(err.to_string()))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("open {}: {err}", self.path)))?;
        file.write_all(&line)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        debug!(path = %self.path, "activity recorded");
        Ok(entry)
    }

    /// Newest first, at most `limit` entries. Unparseable lines are skipped.
    pub fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>, FetchError> {
        if !self.path.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(self.path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("open {}: {err}", self.path)))?;

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| FetchError::Filesystem(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActivityEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(error = %err, "skipping malformed activity line"),
            }
        }

        entries.reverse();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

impl LogSink for ActivityStore {
    fn record(&self, message: &str) {
        if let Err(err) = self.append(message) {
            warn!(error = %err, "failed to save activity log");
        }
    }
}
