//! Progress/result notification and artifact commit seams.
//!
//! The orchestrator reports to a [`Notifier`] and hands finished artifacts to an
//! [`OutputSink`]. Both are implemented by the host; [`TracingNotifier`] and
//! [`LocalDirectorySink`] are the defaults.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{DownloadError, Error, Result};
use crate::file_type::FileType;
use crate::types::{AssetFile, DownloadMetadata, Progress};
use crate::utils::{get_unique_path, split_output_path};

/// Receives user-facing notifications about a job
///
/// Callbacks are invoked from job tasks and must not block. A returned error is
/// logged by the caller and replaced by an [`Event::Notice`](crate::types::Event::Notice).
pub trait Notifier: Send + Sync {
    /// Progress of a running job
    fn on_progress(&self, progress: &Progress) -> Result<()>;

    /// A job committed its artifact; `label` is the sink reference
    fn on_success(&self, label: &str) -> Result<()>;

    /// A job failed or was rejected
    fn on_failure(&self, message: &str, detail: Option<&str>) -> Result<()>;
}

/// Notifier that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn on_progress(&self, progress: &Progress) -> Result<()> {
        tracing::debug!(
            task_id = progress.task_id.0,
            percent = progress.percent,
            message = %progress.message,
            "Download progress"
        );
        Ok(())
    }

    fn on_success(&self, label: &str) -> Result<()> {
        tracing::info!(output = %label, "Download saved");
        Ok(())
    }

    fn on_failure(&self, message: &str, detail: Option<&str>) -> Result<()> {
        tracing::warn!(message = %message, detail = detail.unwrap_or(""), "Download failed");
        Ok(())
    }
}

/// Final destination for committed artifacts
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Store `file` and return a reference to the stored artifact
    ///
    /// Scratch files may be moved; external files must be left in place.
    async fn store(&self, file: &AssetFile, metadata: &DownloadMetadata) -> Result<String>;
}

/// Sink writing artifacts below a local folder
///
/// The artifact lands at `<save_folder>/<output_path>.<ext>`, where the extension
/// comes from the sniffed file type. Existing files are never overwritten; a
/// ` (n)` suffix is added instead.
#[derive(Clone, Debug)]
pub struct LocalDirectorySink {
    save_folder: PathBuf,
}

impl LocalDirectorySink {
    /// Create a sink rooted at `save_folder`
    pub fn new(save_folder: impl Into<PathBuf>) -> Self {
        Self {
            save_folder: save_folder.into(),
        }
    }

    /// Folder artifacts are written under
    pub fn save_folder(&self) -> &Path {
        &self.save_folder
    }

    fn target_path(&self, metadata: &DownloadMetadata, file_type: FileType) -> PathBuf {
        let (dirs, stem) = split_output_path(&metadata.output_path);
        let mut path = self.save_folder.clone();
        path.extend(dirs);
        path.join(format!("{}.{}", stem, file_type.extension()))
    }
}

#[async_trait]
impl OutputSink for LocalDirectorySink {
    async fn store(&self, file: &AssetFile, metadata: &DownloadMetadata) -> Result<String> {
        let file_type = FileType::detect(file.path()).await?;
        if file_type == FileType::Unknown {
            return Err(Error::Download(DownloadError::UnknownMediaType {
                path: file.path().to_path_buf(),
            }));
        }

        let target = self.target_path(metadata, file_type);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Download(DownloadError::CommitFailed(format!(
                    "failed to create '{}': {}",
                    parent.display(),
                    e
                )))
            })?;
        }
        let target = get_unique_path(&target)?;

        match file {
            AssetFile::Scratch(path) => {
                // rename fails across filesystems; fall back to copy + delete
                if let Err(e) = tokio::fs::rename(path, &target).await {
                    tracing::debug!(error = %e, "Rename failed, copying artifact instead");
                    copy_artifact(path, &target).await?;
                    tokio::fs::remove_file(path).await?;
                }
            }
            AssetFile::External(path) => copy_artifact(path, &target).await?,
        }

        tracing::debug!(target = %target.display(), "Artifact stored");
        Ok(target.to_string_lossy().into_owned())
    }
}

async fn copy_artifact(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::copy(from, to).await.map_err(|e| {
        Error::Download(DownloadError::CommitFailed(format!(
            "failed to copy '{}' to '{}': {}",
            from.display(),
            to.display(),
            e
        )))
    })?;
    Ok(())
}
