//! Traits and types for external transcoding

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Conversion performed by a transcoder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscodeAction {
    /// Re-encode an audio unit into the configured voice note format
    AudioConvert,
    /// Download (a window of) a rewritten DASH manifest into a single file
    PlaylistDownload,
    /// Composite the overlay track onto the primary video
    MergeOverlay,
}

impl TranscodeAction {
    /// Name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeAction::AudioConvert => "audio conversion",
            TranscodeAction::PlaylistDownload => "playlist download",
            TranscodeAction::MergeOverlay => "overlay merge",
        }
    }
}

impl std::fmt::Display for TranscodeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transcoder invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscodeRequest {
    /// What to do
    pub action: TranscodeAction,
    /// Primary input (audio unit, manifest or base video)
    pub input: PathBuf,
    /// File to produce
    pub output: PathBuf,
    /// Overlay input for [`TranscodeAction::MergeOverlay`]
    pub overlay: Option<PathBuf>,
    /// Playlist window start
    pub start_time: Option<Duration>,
    /// Playlist window length
    pub duration: Option<Duration>,
}

impl TranscodeRequest {
    /// Request without overlay or time window
    pub fn new(action: TranscodeAction, input: PathBuf, output: PathBuf) -> Self {
        Self {
            action,
            input,
            output,
            overlay: None,
            start_time: None,
            duration: None,
        }
    }
}

/// Statistics reported while a transcode runs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TranscodeStats {
    /// Video frames written so far
    pub frame: u64,
    /// Current encoding frame rate
    pub fps: f64,
    /// Position reached in the output
    pub out_time: Duration,
    /// Current output bitrate as reported (e.g. "1250.3kbits/s")
    pub bitrate: String,
    /// Encoding speed relative to real time (e.g. "2.1x")
    pub speed: String,
    /// Whether this is the final report
    pub finished: bool,
}

impl TranscodeStats {
    /// Status line shown while processing
    pub fn summary(&self) -> String {
        format!(
            "Processing (frames={}, fps={:.1}, time={:.2}s, bitrate={}, speed={})",
            self.frame,
            self.fps,
            self.out_time.as_secs_f64(),
            if self.bitrate.is_empty() { "N/A" } else { &self.bitrate },
            if self.speed.is_empty() { "N/A" } else { &self.speed },
        )
    }
}

/// Receives statistics reports during a transcode
pub type StatsCallback = dyn Fn(&TranscodeStats) + Send + Sync;

/// Trait for external media conversion
///
/// Implementations must either produce `request.output` or return an error; a
/// successful return with no output file is treated as a failure by the caller.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run one conversion, reporting statistics through `on_stats`
    async fn execute(&self, request: &TranscodeRequest, on_stats: &StatsCallback)
    -> crate::Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_formats_stats() {
        let stats = TranscodeStats {
            frame: 120,
            fps: 29.97,
            out_time: Duration::from_millis(4_000),
            bitrate: "900.1kbits/s".to_string(),
            speed: "1.5x".to_string(),
            finished: false,
        };
        assert_eq!(
            stats.summary(),
            "Processing (frames=120, fps=30.0, time=4.00s, bitrate=900.1kbits/s, speed=1.5x)"
        );
        assert!(TranscodeStats::default().summary().contains("bitrate=N/A"));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(TranscodeAction::MergeOverlay.to_string(), "overlay merge");
    }
}
