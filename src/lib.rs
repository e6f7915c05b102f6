//! # media-dl
//!
//! Media acquisition pipeline for chat and social archivers.
//!
//! A job names one or more media units (remote URLs, inline payloads or local
//! files). The downloader fetches every unit concurrently, decrypting AES-CBC
//! streams on the fly, then reassembles the result: split containers are
//! unpacked, overlays are composited onto their video, DASH manifests are
//! rewritten and downloaded, voice notes are converted. The finished artifact is
//! committed to an output sink and recorded in a persistent task registry that
//! rejects content it has already seen.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, DownloadMetadata, DownloadRequest, InputMedia, MediaDownloader, MediaKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.output.save_folder = "downloads".into();
//!
//!     let downloader = MediaDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let metadata = DownloadMetadata {
//!         content_identifier: Some("story-1700000000".to_string()),
//!         output_path: "friends/alice/1700000000".to_string(),
//!         source_tag: "stories".to_string(),
//!         ..Default::default()
//!     };
//!     let unit = InputMedia::new(MediaKind::RemoteUrl, "https://cdn.example.com/media/abc");
//!     downloader
//!         .submit(metadata, DownloadRequest::single(unit))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Reassembly of fetched units (split containers, playlist manifests)
pub mod assembly;
/// Configuration types
pub mod config;
/// AES-CBC stream decryption
pub mod crypto;
/// Database persistence layer
pub mod db;
/// Job orchestration (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Unit fetching
pub mod fetch;
/// Content sniffing
pub mod file_type;
/// Task registry with deduplication
pub mod registry;
/// Output sinks and user notification
pub mod sink;
/// External transcoding
pub mod transcode;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use downloader::{MediaDownloader, MediaDownloaderBuilder};
pub use error::{DatabaseError, DownloadError, Error, Result};
pub use fetch::{ContentResolver, DefaultFetcher, MediaFetcher};
pub use registry::TaskRegistry;
pub use sink::{LocalDirectorySink, Notifier, OutputSink, TracingNotifier};
pub use transcode::{FfmpegTranscoder, NoOpTranscoder, TranscodeAction, Transcoder};
pub use types::{
    AssetFile, DownloadMetadata, DownloadRequest, Event, InputMedia, JobPhase, MediaKind,
    PlaylistOptions, Progress, SourceFilter, TaskId, TaskRecord, TaskStage,
};

/// Block until the process is asked to terminate, then shut the downloader down.
///
/// Termination means SIGTERM or SIGINT on unix and Ctrl+C elsewhere. Jobs still in
/// flight are canceled and the call returns once they drained (or the shutdown
/// timeout passed).
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

/// Resolves on the first termination request the process can observe
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn listen(kind: SignalKind, name: &str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| tracing::warn!(signal = name, error = %e, "Could not register signal handler"))
            .ok()
    }

    async fn next(listener: &mut Option<Signal>) -> Option<()> {
        match listener {
            Some(listener) => listener.recv().await,
            None => std::future::pending().await,
        }
    }

    let mut sigterm = listen(SignalKind::terminate(), "SIGTERM");
    let mut sigint = listen(SignalKind::interrupt(), "SIGINT");
    if sigterm.is_none() && sigint.is_none() {
        // Restricted environments (containers, tests) may refuse both
        tracing::error!("No signal handlers available, falling back to ctrl_c");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    let received = tokio::select! {
        Some(()) = next(&mut sigterm) => "SIGTERM",
        Some(()) = next(&mut sigint) => "SIGINT",
        else => "closed signal stream",
    };
    tracing::info!(signal = received, "Stopping media downloader");
}

/// Resolves on Ctrl+C
#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Ctrl+C listener failed, stopping media downloader");
        return;
    }
    tracing::info!(signal = "ctrl_c", "Stopping media downloader");
}
