//! Download orchestrator split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`submit`] - Dedup gate and job admission
//! - [`control`] - Cancellation of running jobs
//! - [`lifecycle`] - Shutdown coordination
//! - [`job`] - Execution of a single job (fetch, assemble, transcode, commit)

mod control;
mod job;
mod lifecycle;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{ContentResolver, DefaultFetcher, MediaFetcher};
use crate::registry::TaskRegistry;
use crate::sink::{LocalDirectorySink, Notifier, OutputSink, TracingNotifier};
use crate::transcode::{FfmpegTranscoder, NoOpTranscoder, Transcoder};
use crate::types::{Event, Progress, TaskId};

/// Capacity of the event broadcast channel
const EVENT_BUFFER: usize = 1000;

/// Collaborators a job talks to
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    pub(crate) transcoder: Arc<dyn Transcoder>,
    pub(crate) sink: Arc<dyn OutputSink>,
    pub(crate) notifier: Arc<dyn Notifier>,
}

/// Running jobs and admission state
#[derive(Clone)]
pub(crate) struct JobState {
    /// Cancellation tokens of jobs that have not finished yet
    pub(crate) active: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    pub(crate) config: Arc<Config>,
    pub(crate) registry: TaskRegistry,
    pub(crate) services: Services,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) jobs: JobState,
}

impl MediaDownloader {
    /// Create a downloader with the default collaborators
    ///
    /// Opens the registry at `persistence.database_path`, writes artifacts below
    /// `output.save_folder` and uses ffmpeg when it can be found.
    pub async fn new(config: Config) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Start building a downloader with custom collaborators
    pub fn builder(config: Config) -> MediaDownloaderBuilder {
        MediaDownloaderBuilder {
            config,
            registry: None,
            fetcher: None,
            resolver: None,
            transcoder: None,
            sink: None,
            notifier: None,
        }
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives every event. A subscriber that falls more than
    /// 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The task registry backing this downloader
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Name of the transcoder in use
    pub fn transcoder_name(&self) -> &'static str {
        self.services.transcoder.name()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    /// Push progress to subscribers and the notifier
    pub(crate) fn report_progress(&self, progress: Progress) {
        self.emit_event(Event::Progress {
            id: progress.task_id,
            percent: progress.percent,
            message: progress.message.clone(),
        });
        if let Err(e) = self.services.notifier.on_progress(&progress) {
            self.notice_fallback(&e, progress.message);
        }
    }

    pub(crate) fn report_success(&self, label: &str) {
        if let Err(e) = self.services.notifier.on_success(label) {
            self.notice_fallback(&e, format!("Saved {}", label));
        }
    }

    pub(crate) fn report_failure(&self, message: &str, detail: Option<&str>) {
        if let Err(e) = self.services.notifier.on_failure(message, detail) {
            let text = match detail {
                Some(detail) => format!("{}: {}", message, detail),
                None => message.to_string(),
            };
            self.notice_fallback(&e, text);
        }
    }

    fn notice_fallback(&self, error: &Error, message: String) {
        tracing::warn!(error = %error, "Notifier failed, falling back to local notice");
        self.emit_event(Event::Notice { message });
    }
}

/// Builder for [`MediaDownloader`]
///
/// Every collaborator not set explicitly falls back to its default.
pub struct MediaDownloaderBuilder {
    config: Config,
    registry: Option<TaskRegistry>,
    fetcher: Option<Arc<dyn MediaFetcher>>,
    resolver: Option<Arc<dyn ContentResolver>>,
    transcoder: Option<Arc<dyn Transcoder>>,
    sink: Option<Arc<dyn OutputSink>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl MediaDownloaderBuilder {
    /// Use an already opened registry
    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the fetcher
    pub fn fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Resolver for protocol units, used by the default fetcher
    pub fn resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replace the transcoder
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Replace the output sink
    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the notifier
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validate the configuration and assemble the downloader
    pub async fn build(self) -> Result<MediaDownloader> {
        let config = self.config;
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.temp_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.download.temp_dir.display(),
                        e
                    ),
                ))
            })?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => TaskRegistry::open(&config.persistence.database_path).await?,
        };

        let fetcher: Arc<dyn MediaFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let mut fetcher = DefaultFetcher::new(&config.download)?;
                if let Some(resolver) = self.resolver {
                    fetcher = fetcher.with_resolver(resolver);
                }
                Arc::new(fetcher)
            }
        };

        let transcoder: Arc<dyn Transcoder> = match self.transcoder {
            Some(transcoder) => transcoder,
            None => match FfmpegTranscoder::from_config(&config.tools) {
                Some(ffmpeg) => Arc::new(ffmpeg),
                None => Arc::new(NoOpTranscoder),
            },
        };
        tracing::info!(transcoder = transcoder.name(), "Transcoder initialized");

        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(LocalDirectorySink::new(config.output.save_folder.clone())));
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));

        let (event_tx, _rx) = broadcast::channel(EVENT_BUFFER);

        Ok(MediaDownloader {
            config: Arc::new(config),
            registry,
            services: Services {
                fetcher,
                transcoder,
                sink,
                notifier,
            },
            event_tx,
            jobs: JobState::default(),
        })
    }
}
