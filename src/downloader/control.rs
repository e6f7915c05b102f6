//! Cancellation of running jobs.

use crate::error::{Error, Result};
use crate::types::TaskId;

use super::MediaDownloader;

impl MediaDownloader {
    /// Cancel a running job
    ///
    /// Cancellation is cooperative: the job stops at its next checkpoint, cleans
    /// its scratch files and ends in the `Canceled` stage without committing.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no job with this id is running.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let active = self.jobs.active.lock().await;
        let token = active
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("no running job with id {}", id)))?;
        token.cancel();
        tracing::info!(task_id = id.0, "Job cancellation requested");
        Ok(())
    }

    /// Cancel every running job, returning how many were signaled
    pub async fn cancel_all(&self) -> usize {
        let active = self.jobs.active.lock().await;
        for (id, token) in active.iter() {
            tracing::debug!(task_id = id.0, "Signaling cancellation");
            token.cancel();
        }
        active.len()
    }

    /// Ids of the jobs currently running, newest first
    pub async fn active_jobs(&self) -> Vec<TaskId> {
        let active = self.jobs.active.lock().await;
        let mut ids: Vec<TaskId> = active.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }
}
