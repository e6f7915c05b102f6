//! Shared test helpers for creating MediaDownloader instances in tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tempfile::TempDir;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::downloader::{MediaDownloader, MediaDownloaderBuilder};
use crate::error::{DownloadError, Error, Result};
use crate::sink::{Notifier, OutputSink};
use crate::transcode::{StatsCallback, TranscodeAction, TranscodeRequest, TranscodeStats, Transcoder};
use crate::types::{
    AssetFile, DownloadMetadata, Event, InputMedia, MediaKind, Progress, TaskId,
};

pub(crate) const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00";
pub(crate) const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";
pub(crate) const MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00";
pub(crate) const MP3: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00";
pub(crate) const OGG: &[u8] = b"OggS\x00\x02\x00\x00\x00\x00";

/// One call seen by [`MockTranscoder`]
#[derive(Clone, Debug)]
pub(crate) struct TranscodeCall {
    pub(crate) request: TranscodeRequest,
    /// Whether the input (and overlay, if any) existed when the call was made
    pub(crate) inputs_existed: bool,
    /// Input file content for playlist downloads
    pub(crate) manifest: Option<String>,
}

/// Transcoder that writes a fixed header for the produced format
#[derive(Default)]
pub(crate) struct MockTranscoder {
    calls: Mutex<Vec<TranscodeCall>>,
}

impl MockTranscoder {
    pub(crate) fn calls(&self) -> Vec<TranscodeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn execute(&self, request: &TranscodeRequest, on_stats: &StatsCallback) -> Result<()> {
        let inputs_existed = request.input.exists()
            && request.overlay.as_ref().is_none_or(|overlay| overlay.exists());
        let manifest = match request.action {
            TranscodeAction::PlaylistDownload => {
                Some(tokio::fs::read_to_string(&request.input).await.unwrap())
            }
            _ => None,
        };
        self.calls.lock().unwrap().push(TranscodeCall {
            request: request.clone(),
            inputs_existed,
            manifest,
        });

        on_stats(&TranscodeStats {
            frame: 10,
            finished: true,
            ..Default::default()
        });

        let output = match request.action {
            TranscodeAction::AudioConvert => MP3,
            _ => MP4,
        };
        tokio::fs::write(&request.output, output).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Notifier that records every callback and can be told to fail
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) progress: Mutex<Vec<Progress>>,
    pub(crate) successes: Mutex<Vec<String>>,
    pub(crate) failures: Mutex<Vec<(String, Option<String>)>>,
    pub(crate) failing: bool,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub(crate) fn percents(&self) -> Vec<u8> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| p.percent)
            .collect()
    }

    pub(crate) fn failure_messages(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    fn outcome(&self) -> Result<()> {
        if self.failing {
            return Err(Error::Other("notification channel unavailable".to_string()));
        }
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    fn on_progress(&self, progress: &Progress) -> Result<()> {
        self.progress.lock().unwrap().push(progress.clone());
        self.outcome()
    }

    fn on_success(&self, label: &str) -> Result<()> {
        self.successes.lock().unwrap().push(label.to_string());
        self.outcome()
    }

    fn on_failure(&self, message: &str, detail: Option<&str>) -> Result<()> {
        self.failures
            .lock()
            .unwrap()
            .push((message.to_string(), detail.map(str::to_string)));
        self.outcome()
    }
}

/// Sink that rejects every artifact
pub(crate) struct RejectingSink;

#[async_trait]
impl OutputSink for RejectingSink {
    async fn store(&self, _file: &AssetFile, _metadata: &DownloadMetadata) -> Result<String> {
        Err(Error::Download(DownloadError::CommitFailed(
            "storage is full".to_string(),
        )))
    }
}

/// Downloader wired to mocks, plus the handles tests inspect
pub(crate) struct TestEnv {
    pub(crate) downloader: MediaDownloader,
    pub(crate) transcoder: Arc<MockTranscoder>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) dir: TempDir,
}

impl TestEnv {
    pub(crate) fn temp_dir(&self) -> PathBuf {
        self.dir.path().join("temp")
    }

    pub(crate) fn save_folder(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Number of files and folders left below the scratch root
    pub(crate) fn scratch_entries(&self) -> usize {
        count_entries(&self.temp_dir())
    }
}

pub(crate) fn count_entries(root: &Path) -> usize {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .count()
}

/// Test downloader with mock transcoder, recording notifier and a 100 kB progress threshold
pub(crate) async fn create_test_env() -> TestEnv {
    create_test_env_with(|_| {}, Arc::new(RecordingNotifier::default()), |builder| builder).await
}

pub(crate) async fn create_test_env_with(
    configure: impl FnOnce(&mut Config),
    notifier: Arc<RecordingNotifier>,
    customize: impl FnOnce(MediaDownloaderBuilder) -> MediaDownloaderBuilder,
) -> TestEnv {
    let dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.persistence.database_path = dir.path().join("test.db");
    config.download.temp_dir = dir.path().join("temp");
    config.download.progress_threshold_bytes = 100_000;
    config.output.save_folder = dir.path().join("out");
    config.media.cdn_base_url = "https://cdn.example/d/".to_string();
    configure(&mut config);

    let transcoder = Arc::new(MockTranscoder::default());
    let builder = MediaDownloader::builder(config)
        .transcoder(transcoder.clone())
        .notifier(notifier.clone());
    let downloader = customize(builder).build().await.unwrap();

    TestEnv {
        downloader,
        transcoder,
        notifier,
        dir,
    }
}

pub(crate) fn metadata(content_identifier: &str) -> DownloadMetadata {
    DownloadMetadata {
        content_identifier: Some(content_identifier.to_string()),
        output_path: format!("chat/{}", content_identifier),
        source_tag: "chat_media".to_string(),
        author_label: Some("alice".to_string()),
        icon_ref: None,
    }
}

pub(crate) fn inline(bytes: &[u8]) -> InputMedia {
    InputMedia::new(
        MediaKind::InlineEncoded,
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes),
    )
}

fn terminal_id(event: &Event) -> Option<TaskId> {
    match event {
        Event::Completed { id, .. } | Event::Failed { id, .. } | Event::Canceled { id } => {
            Some(*id)
        }
        _ => None,
    }
}

/// Collect events until every job in `ids` reached its terminal event
pub(crate) async fn events_until_all_terminal(
    rx: &mut broadcast::Receiver<Event>,
    ids: &[TaskId],
) -> Vec<Event> {
    let mut pending: HashSet<TaskId> = ids.iter().copied().collect();
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(id) = terminal_id(&event) {
                        pending.remove(&id);
                    }
                    events.push(event);
                    if pending.is_empty() {
                        return events;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for jobs to finish")
}

/// Collect events until the terminal event of `id`, which is returned last
pub(crate) async fn events_until_terminal(
    rx: &mut broadcast::Receiver<Event>,
    id: TaskId,
) -> Vec<Event> {
    events_until_all_terminal(rx, &[id]).await
}

/// Wait for the terminal event of `id`
pub(crate) async fn wait_for_terminal(rx: &mut broadcast::Receiver<Event>, id: TaskId) -> Event {
    events_until_terminal(rx, id).await.pop().unwrap()
}
