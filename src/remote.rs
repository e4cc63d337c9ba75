use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::config::HostProfile;
use crate::error::FetchError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// An authenticated shell session on a remote host.
pub trait RemoteSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, FetchError>;
    fn close(&mut self) -> Result<(), FetchError>;
}

pub trait RemoteConnector: Send + Sync {
    type Session: RemoteSession;

    fn connect(&self, profile: &HostProfile) -> Result<Self::Session, FetchError>;
}

/// File-level view of a remote host. Callers never see shell syntax.
pub trait RemoteFiles {
    /// Transport failures read as "absent"; the test command exit status is the only signal.
    fn exists(&mut self, path: &str) -> bool;

    /// Last `lines` lines of `path`. Any error-channel output fails the read.
    fn read_tail(&mut self, path: &str, lines: u32) -> Result<String, FetchError>;
}

impl<S: RemoteSession + ?Sized> RemoteFiles for S {
    fn exists(&mut self, path: &str) -> bool {
        let command = format!("[ -f {} ]", shell_quote(path));
        match self.exec(&command) {
            Ok(output) => output.success(),
            Err(err) => {
                debug!(path, error = %err, "existence check failed, treating as absent");
                false
            }
        }
    }

    fn read_tail(&mut self, path: &str, lines: u32) -> Result<String, FetchError> {
        let command = format!("tail -n {lines} {}", shell_quote(path));
        let output = self.exec(&command)?;
        if !output.stderr.is_empty() {
            return Err(FetchError::RemoteStderr(output.stderr));
        }
        Ok(output.stdout)
    }
}

/// Single-quotes `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Owns a session for the length of one request and closes it exactly once on drop.
pub struct SessionGuard<S: RemoteSession> {
    session: S,
}

impl<S: RemoteSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: RemoteSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl<S: RemoteSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl<S: RemoteSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Err(err) = self.session.close() {
            warn!(error = %err, "failed to close remote session");
        }
    }
}
