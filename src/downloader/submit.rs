//! Job admission: dedup gate, task creation and spawning.

use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use crate::error::{DatabaseError, DownloadError, Error, Result};
use crate::types::{DownloadMetadata, DownloadRequest, Event, TaskId, TaskRecord, TaskStage};

use super::MediaDownloader;
use super::job::{JobContext, run_job};

impl MediaDownloader {
    /// Submit a download job
    ///
    /// The content is first checked against the registry: a task that is still
    /// in flight yields [`DownloadError::AlreadyQueued`], a successful one
    /// [`DownloadError::AlreadyDownloaded`]. Otherwise a task is created, moved to
    /// `Running` and the job is spawned. The returned id identifies the task; the
    /// outcome is reported through events, the notifier and the registry.
    ///
    /// # Errors
    ///
    /// Besides the two dedup errors, fails with [`Error::ShuttingDown`] after
    /// [`shutdown`](Self::shutdown) and with a download error when the request is
    /// malformed.
    pub async fn submit(
        &self,
        metadata: DownloadMetadata,
        request: DownloadRequest,
    ) -> Result<TaskId> {
        if !self.jobs.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if let Err(e) = request.validate() {
            self.report_failure("Invalid download request", Some(&e.to_string()));
            return Err(e);
        }

        let hash = metadata.dedup_hash();
        match self.registry.lookup(&hash).await? {
            Some(TaskStage::Success) => {
                return Err(self.reject(DownloadError::AlreadyDownloaded { hash }));
            }
            Some(_) => return Err(self.reject(DownloadError::AlreadyQueued { hash })),
            None => {}
        }

        let title = metadata.title();
        let mut record = TaskRecord::pending(hash.clone(), metadata);
        let id = match self.registry.create(record.clone()).await {
            Ok(id) => id,
            // Lost a race against a concurrent submit of the same content
            Err(Error::Database(DatabaseError::DuplicateKey(_))) => {
                return Err(self.reject(DownloadError::AlreadyQueued { hash }));
            }
            Err(e) => return Err(e),
        };
        record.id = id;
        tracing::info!(task_id = id.0, hash = %hash, title = %title, "Task created");
        self.emit_event(Event::Queued { id, title });

        record.stage = TaskStage::Running;
        if let Err(e) = self.registry.update(record.clone()).await {
            tracing::error!(task_id = id.0, error = %e, "Failed to mark task running");
            if let Err(remove_err) = self.registry.remove(id).await {
                tracing::warn!(task_id = id.0, error = %remove_err, "Failed to remove unstarted task");
            }
            let message = e.to_string();
            self.report_failure("Download failed", Some(&message));
            self.emit_event(Event::Failed { id, error: message });
            return Err(e);
        }

        let cancel = CancellationToken::new();
        {
            let mut active = self.jobs.active.lock().await;
            // Shutdown may have started while the task was being created
            if !self.jobs.accepting_new.load(Ordering::SeqCst) {
                drop(active);
                record.stage = TaskStage::Canceled;
                if let Err(e) = self.registry.update(record).await {
                    tracing::warn!(task_id = id.0, error = %e, "Failed to cancel task during shutdown");
                }
                self.emit_event(Event::Canceled { id });
                return Err(Error::ShuttingDown);
            }
            active.insert(id, cancel.clone());
        }

        let ctx = match JobContext::new(self.clone(), record.clone(), cancel) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(task_id = id.0, error = %e, "Failed to create job scratch directory");
                self.jobs.active.lock().await.remove(&id);
                record.stage = TaskStage::Failed;
                if let Err(update_err) = self.registry.update(record).await {
                    tracing::warn!(task_id = id.0, error = %update_err, "Failed to mark task failed");
                }
                let message = e.to_string();
                self.report_failure("Download failed", Some(&message));
                self.emit_event(Event::Failed { id, error: message });
                return Err(e);
            }
        };

        tokio::spawn(run_job(ctx, request));
        Ok(id)
    }

    /// Submit a job received as serialized metadata and request payloads
    ///
    /// Both payloads are JSON documents matching [`DownloadMetadata`] and
    /// [`DownloadRequest`]. A payload that does not parse is reported to the
    /// notifier and returned as [`Error::Serialization`].
    pub async fn submit_payload(&self, metadata_json: &str, request_json: &str) -> Result<TaskId> {
        let parsed = serde_json::from_str::<DownloadMetadata>(metadata_json).and_then(|metadata| {
            serde_json::from_str::<DownloadRequest>(request_json).map(|request| (metadata, request))
        });
        match parsed {
            Ok((metadata, request)) => self.submit(metadata, request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed job payload");
                self.report_failure("Failed to parse download request", Some(&e.to_string()));
                Err(Error::Serialization(e))
            }
        }
    }

    fn reject(&self, reason: DownloadError) -> Error {
        let message = match &reason {
            DownloadError::AlreadyDownloaded { .. } => "Already downloaded",
            _ => "Already queued",
        };
        tracing::info!(reason = %reason, "Duplicate download rejected");
        self.report_failure(message, None);
        Error::Download(reason)
    }
}
