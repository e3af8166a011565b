//! Crash-safe writes of downloaded objects.
//!
//! Bytes are streamed into a hidden temp file next to the destination,
//! flushed and fsynced, then renamed over the destination.  A run that dies
//! mid-download leaves at most a stray `.part` file, never a truncated
//! object at the final path.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// A temp file that becomes `destination` on [`StagedFile::commit`].
///
/// Dropping an uncommitted `StagedFile` removes the temp file.
pub struct StagedFile {
    file: Option<tokio::fs::File>,
    temp_path: PathBuf,
    destination: PathBuf,
    written: u64,
}

impl StagedFile {
    /// Open a temp file alongside `destination`.
    ///
    /// The parent directory must already exist.
    pub async fn create(destination: &Path) -> anyhow::Result<Self> {
        let temp_path = temp_path_for(destination);
        let file = tokio::fs::File::create(&temp_path).await?;

        Ok(Self {
            file: Some(file),
            temp_path,
            destination: destination.to_path_buf(),
            written: 0,
        })
    }

    /// Append a chunk.
    pub async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("staged file already committed"))?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush, fsync and rename into place, replacing any existing file.
    /// Returns the number of bytes written.
    pub async fn commit(mut self) -> anyhow::Result<u64> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| anyhow::anyhow!("staged file already committed"))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&self.temp_path, &self.destination).await?;
        Ok(self.written)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// `dir/name` -> `dir/.<uuid>.part`
///
/// The temp name has a fixed length, so any name that fits on disk can be
/// staged.
fn temp_path_for(destination: &Path) -> PathBuf {
    let id = uuid::Uuid::new_v4();
    destination.with_file_name(format!(".{id}.part"))
}
