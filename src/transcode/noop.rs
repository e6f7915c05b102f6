//! No-op transcoder for graceful degradation

use super::traits::{StatsCallback, TranscodeRequest, Transcoder};
use async_trait::async_trait;

/// Transcoder used when no ffmpeg binary is available
///
/// Jobs that need no conversion still complete; jobs that do fail with
/// `Error::NotSupported`.
pub struct NoOpTranscoder;

#[async_trait]
impl Transcoder for NoOpTranscoder {
    async fn execute(
        &self,
        request: &TranscodeRequest,
        _on_stats: &StatsCallback,
    ) -> crate::Result<()> {
        Err(crate::Error::NotSupported(format!(
            "{} requires an external ffmpeg binary. \
             Configure tools.ffmpeg_path or ensure ffmpeg is in PATH.",
            request.action
        )))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
