//! The scratch directory holding the running job's files.
//!
//! Files are flat: names that could address anything outside the directory
//! are dropped on the way in and refused at runtime.

use std::path::{Path, PathBuf};

use tarn_eval::{is_safe_file_name, FileStore};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::HostResult;
use crate::protocol::FileMap;

/// The job workspace directory. Owned by the scheduler.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create (if needed) and empty the directory at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> HostResult<Self> {
        let workspace = Self { root: root.into() };
        fs::create_dir_all(&workspace.root).await?;
        workspace.clear().await?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a job's files. Unsafe names and files the filesystem refuses
    /// are skipped. Returns how many files were written.
    pub async fn materialize(&self, files: &FileMap) -> HostResult<usize> {
        let mut written = 0;
        for (name, contents) in files {
            if !is_safe_file_name(name) {
                warn!(file = %name, "dropping file with unsafe name");
                continue;
            }
            if let Err(e) = fs::write(self.root.join(name), contents).await {
                warn!(file = %name, error = %e, "dropping file that could not be written");
                continue;
            }
            written += 1;
        }
        debug!(written, "materialized job files");
        Ok(written)
    }

    /// Read one file; `None` if it does not exist or the name is unsafe.
    pub async fn read(&self, name: &str) -> HostResult<Option<String>> {
        if !is_safe_file_name(name) {
            return Ok(None);
        }
        match fs::read_to_string(self.root.join(name)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read back every regular file as the job's result.
    pub async fn collect(&self) -> HostResult<FileMap> {
        let mut files = FileMap::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping file with non UTF-8 name");
                continue;
            };
            match fs::read_to_string(entry.path()).await {
                Ok(contents) => {
                    files.insert(name, contents);
                }
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable file"),
            }
        }
        Ok(files)
    }

    /// Remove everything in the directory.
    pub async fn clear(&self) -> HostResult<()> {
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "failed to delete workspace entry");
            }
        }
        Ok(())
    }

    /// A synchronous store over the directory, for the evaluator thread.
    pub fn store(&self) -> WorkspaceFiles {
        WorkspaceFiles {
            root: self.root.clone(),
        }
    }
}

/// [`FileStore`] backed by the workspace directory.
#[derive(Debug, Clone)]
pub struct WorkspaceFiles {
    root: PathBuf,
}

impl FileStore for WorkspaceFiles {
    fn read(&self, name: &str) -> Option<String> {
        if !is_safe_file_name(name) {
            return None;
        }
        std::fs::read_to_string(self.root.join(name)).ok()
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<(), String> {
        if !is_safe_file_name(name) {
            return Err(format!("invalid file name '{name}'"));
        }
        std::fs::write(self.root.join(name), contents).map_err(|e| format!("cannot write '{name}': {e}"))
    }
}
