//! Job context -- state shared by the phases of a single job.

use std::path::Path;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Error, Result};
use crate::types::{Event, JobPhase, Progress, TaskId, TaskRecord};

use super::super::MediaDownloader;

/// Shared context for a single job, reducing parameter passing between phases.
///
/// The scratch directory is private to the job; every intermediate file lives
/// inside it and is removed with it when the job ends.
pub(crate) struct JobContext {
    pub(crate) id: TaskId,
    pub(crate) record: TaskRecord,
    pub(crate) cancel: CancellationToken,
    pub(crate) scratch: TempDir,
    pub(crate) downloader: MediaDownloader,
}

impl JobContext {
    /// Create the context and its scratch directory under the configured temp dir
    pub(crate) fn new(
        downloader: MediaDownloader,
        record: TaskRecord,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job-{}-", record.id.0))
            .tempdir_in(&downloader.config.download.temp_dir)
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create scratch directory in '{}': {}",
                        downloader.config.download.temp_dir.display(),
                        e
                    ),
                ))
            })?;

        Ok(Self {
            id: record.id,
            record,
            cancel,
            scratch,
            downloader,
        })
    }

    pub(crate) fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Fail with [`DownloadError::Canceled`] once the job was canceled
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Download(DownloadError::Canceled));
        }
        Ok(())
    }

    pub(crate) fn enter_phase(&self, phase: JobPhase) {
        tracing::debug!(task_id = self.id.0, ?phase, "Job phase");
        self.downloader.emit_event(Event::Phase { id: self.id, phase });
    }

    pub(crate) fn reporter(&self) -> ProgressReporter {
        ProgressReporter {
            id: self.id,
            downloader: self.downloader.clone(),
        }
    }
}

/// Cloneable handle child tasks use to report progress for their job
#[derive(Clone)]
pub(crate) struct ProgressReporter {
    id: TaskId,
    downloader: MediaDownloader,
}

impl ProgressReporter {
    pub(crate) fn report(&self, percent: Option<u8>, message: impl Into<String>) {
        self.downloader.report_progress(Progress {
            task_id: self.id,
            percent,
            message: message.into(),
        });
    }

    pub(crate) fn downloading(&self, percent: u8) {
        self.report(Some(percent), format!("Downloading ({}%)", percent));
    }
}
