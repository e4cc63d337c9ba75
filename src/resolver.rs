use tracing::debug;

use crate::domain::{LogExtension, ResolvedFile, remote_path};
use crate::error::FetchError;
use crate::remote::RemoteFiles;

/// Picks the remote log file for a device: `<dir>/<id>.txt`, else `<dir>/<id>.xml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResolver;

impl FileResolver {
    pub fn resolve<F: RemoteFiles + ?Sized>(
        &self,
        files: &mut F,
        directory: &str,
        identifier: &str,
    ) -> Result<ResolvedFile, FetchError> {
        for extension in LogExtension::CANDIDATES {
            let path = remote_path(directory, identifier, extension);
            if files.exists(&path) {
                debug!(identifier, %path, "resolved");
                return Ok(ResolvedFile::new(directory, identifier, extension));
            }
        }
        debug!(identifier, directory, "no candidate file");
        Err(FetchError::NotFound {
            identifier: identifier.to_string(),
        })
    }
}
