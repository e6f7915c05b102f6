//! Commit and terminal stage handling.

use crate::error::{DownloadError, Error, Result};
use crate::types::{AssetFile, Event, JobPhase, TaskStage};

use super::context::JobContext;

/// Hand the artifact to the output sink, returning its reference
pub(super) async fn commit(ctx: &JobContext, artifact: &AssetFile) -> Result<String> {
    ctx.enter_phase(JobPhase::Committing);
    ctx.downloader
        .services
        .sink
        .store(artifact, &ctx.record.metadata)
        .await
        .map_err(|e| match e {
            Error::Download(_) => e,
            other => Error::Download(DownloadError::CommitFailed(other.to_string())),
        })
}

/// Record the job outcome
///
/// The scratch directory is removed first so no intermediate file outlives the
/// terminal stage. Then the registry is updated, the job leaves the active map and
/// the notifier and subscribers are told.
pub(super) async fn finalize_job(ctx: JobContext, outcome: Result<String>) {
    let JobContext {
        id,
        mut record,
        scratch,
        downloader,
        ..
    } = ctx;

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!(
            task_id = id.0,
            path = %scratch_path.display(),
            error = %e,
            "Failed to remove job scratch directory"
        );
    }

    let (stage, phase) = match &outcome {
        Ok(_) => (TaskStage::Success, JobPhase::Done),
        Err(e) if e.is_canceled() => (TaskStage::Canceled, JobPhase::Canceled),
        Err(_) => (TaskStage::Failed, JobPhase::Failed),
    };
    record.stage = stage;
    record.output_file = outcome.as_ref().ok().cloned();
    if let Err(e) = downloader.registry.update(record).await {
        tracing::error!(task_id = id.0, error = %e, "Failed to record final task stage");
    }

    downloader.jobs.active.lock().await.remove(&id);
    downloader.emit_event(Event::Phase { id, phase });

    match outcome {
        Ok(output) => {
            tracing::info!(task_id = id.0, output = %output, "Download completed");
            downloader.report_success(&output);
            downloader.emit_event(Event::Completed { id, output });
        }
        Err(e) if e.is_canceled() => {
            tracing::info!(task_id = id.0, "Download canceled");
            downloader.emit_event(Event::Canceled { id });
        }
        Err(e) => {
            tracing::error!(task_id = id.0, error = %e, "Download failed");
            let error = e.to_string();
            downloader.report_failure("Download failed", Some(&error));
            downloader.emit_event(Event::Failed { id, error });
        }
    }
}
