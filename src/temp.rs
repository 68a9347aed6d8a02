// Scoped staging of uploaded bytes to local storage. The returned guard
// deletes the staged file when dropped, so cleanup happens on every exit
// path of the owning request, including early returns and panics.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A staged upload on disk, removed when the guard goes out of scope.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    /// Write `bytes` to `temp_<name>` inside `dir`, overwriting any existing
    /// file at that path.
    pub async fn stage(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        let path = dir.join(format!("temp_{}", name));
        tokio::fs::write(&path, bytes).await?;
        debug!("Staged upload at {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        // Idempotent: the file may already be gone.
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged file {}: {}", self.path.display(), e),
        }
    }
}

/// Strip any directory components from a client-supplied filename so staged
/// and output files always land inside the configured work directory.
pub fn sanitize_filename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload")
        .to_string()
}
