use std::path::{Path, PathBuf};

use sandbox::SandboxError;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extension given to every submitted script.
const SCRIPT_EXTENSION: &str = "py";

/// Script location for a run: `<temp_dir>/script_<uuid>.py`.
pub fn script_path(temp_dir: &Path, run_id: Uuid) -> PathBuf {
    temp_dir.join(format!("script_{}.{SCRIPT_EXTENSION}", run_id.simple()))
}

/// A submitted script on disk. The file is removed when the guard is dropped,
/// so every exit path of an execution cleans up after itself.
pub(crate) struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    /// Write `code` to a fresh file at `path`.
    ///
    /// Opens with `create_new`: an existing file is never reused or truncated.
    pub(crate) async fn create(path: PathBuf, code: &str) -> sandbox::Result<Self> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| SandboxError::WriteScript {
                    path: dir.display().to_string(),
                    source,
                })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| SandboxError::WriteScript {
                path: path.display().to_string(),
                source,
            })?;

        // From here on the guard owns the file, so a failed write still removes it.
        let script = Self { path };
        let written = async {
            file.write_all(code.as_bytes()).await?;
            file.flush().await
        }
        .await;
        written.map_err(|source| SandboxError::WriteScript {
            path: script.path.display().to_string(),
            source,
        })?;

        debug!(path = %script.path.display(), bytes = code.len(), "script written");
        Ok(script)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "script removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove script"),
        }
    }
}
