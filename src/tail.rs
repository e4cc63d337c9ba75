use tracing::debug;

use crate::domain::ResolvedFile;
use crate::error::FetchError;
use crate::remote::RemoteFiles;

#[derive(Debug, Clone, Copy)]
pub struct TailFetcher {
    max_lines: u32,
}

impl TailFetcher {
    pub fn new(max_lines: u32) -> Self {
        Self { max_lines }
    }

    pub fn fetch_tail<F: RemoteFiles + ?Sized>(
        &self,
        files: &mut F,
        file: &ResolvedFile,
    ) -> Result<String, FetchError> {
        let content = files.read_tail(&file.remote_path, self.max_lines)?;
        debug!(
            path = %file.remote_path,
            bytes = content.len(),
            "tail fetched"
        );
        Ok(content)
    }
}
