//! ffmpeg-based transcoder using an external binary

use super::parser::StatsParser;
use super::traits::{StatsCallback, TranscodeAction, TranscodeRequest, Transcoder};
use crate::config::{FfmpegOptions, ToolsConfig};
use crate::error::{DownloadError, Error};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Protocols ffmpeg may follow from a rewritten DASH manifest
const PLAYLIST_PROTOCOLS: &str = "file,http,https,tcp,tls";

/// Number of trailing stderr lines kept in a failure message
const STDERR_TAIL_LINES: usize = 5;

/// Transcoder backed by the `ffmpeg` command line tool
///
/// Statistics are read from `-progress pipe:1` on stdout while stderr is kept for
/// error reporting.
///
/// # Examples
///
/// ```no_run
/// use media_dl::config::FfmpegOptions;
/// use media_dl::transcode::FfmpegTranscoder;
/// use std::path::PathBuf;
///
/// // Explicit binary
/// let ffmpeg = FfmpegTranscoder::new(PathBuf::from("/usr/bin/ffmpeg"), FfmpegOptions::default());
///
/// // Or auto-discover from PATH
/// let ffmpeg = FfmpegTranscoder::from_path(FfmpegOptions::default())
///     .expect("ffmpeg not found in PATH");
/// ```
pub struct FfmpegTranscoder {
    binary_path: PathBuf,
    options: FfmpegOptions,
}

impl FfmpegTranscoder {
    /// Create a transcoder with an explicit binary path
    pub fn new(binary_path: PathBuf, options: FfmpegOptions) -> Self {
        Self {
            binary_path,
            options,
        }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path(options: FfmpegOptions) -> Option<Self> {
        which::which("ffmpeg")
            .ok()
            .map(|path| Self::new(path, options))
    }

    /// Resolve the binary from the tools configuration
    ///
    /// An explicit `ffmpeg_path` wins; otherwise PATH is searched when
    /// `search_path` is enabled.
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        match &tools.ffmpeg_path {
            Some(path) => Some(Self::new(path.clone(), tools.ffmpeg.clone())),
            None if tools.search_path => Self::from_path(tools.ffmpeg.clone()),
            None => None,
        }
    }

    /// Full argument list for a request
    pub fn build_args(&self, request: &TranscodeRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y",
            "-nostdin",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.extend(self.options.custom_input_args.iter().map(OsString::from));

        match request.action {
            TranscodeAction::AudioConvert => {
                args.push("-i".into());
                args.push(request.input.clone().into_os_string());
                args.push("-vn".into());
                args.push("-b:a".into());
                args.push(format!("{}k", self.options.audio_bitrate).into());
            }
            TranscodeAction::PlaylistDownload => {
                args.push("-protocol_whitelist".into());
                args.push(PLAYLIST_PROTOCOLS.into());
                if let Some(start) = request.start_time {
                    args.push("-ss".into());
                    args.push(seconds(start).into());
                }
                args.push("-i".into());
                args.push(request.input.clone().into_os_string());
                if let Some(duration) = request.duration {
                    args.push("-t".into());
                    args.push(seconds(duration).into());
                }
                args.push("-c".into());
                args.push("copy".into());
            }
            TranscodeAction::MergeOverlay => {
                let mut graph = String::from("[1:v][0:v]scale2ref[ov][base];[base][ov]overlay");
                if let Some(filter) = &self.options.custom_video_filter {
                    graph.push(',');
                    graph.push_str(filter);
                }
                graph.push_str("[merged]");

                args.push("-i".into());
                args.push(request.input.clone().into_os_string());
                args.push("-i".into());
                if let Some(overlay) = &request.overlay {
                    args.push(overlay.clone().into_os_string());
                }
                args.push("-filter_complex".into());
                args.push(graph.into());
                args.push("-map".into());
                args.push("[merged]".into());
                args.push("-map".into());
                args.push("0:a?".into());
                args.push("-c:v".into());
                args.push(self.options.video_codec.clone().into());
                args.push("-preset".into());
                args.push(self.options.preset.clone().into());
                args.push("-crf".into());
                args.push(self.options.constant_rate_factor.to_string().into());
                if let Some(bitrate) = self.options.video_bitrate {
                    args.push("-b:v".into());
                    args.push(format!("{}k", bitrate).into());
                }
                args.push("-c:a".into());
                args.push("copy".into());
            }
        }

        if let Some(threads) = self.options.threads {
            args.push("-threads".into());
            args.push(threads.to_string().into());
        }
        args.push(request.output.clone().into_os_string());
        args
    }

    fn failed(action: TranscodeAction, reason: impl Into<String>) -> Error {
        Error::Download(DownloadError::TranscodeFailed {
            action: action.to_string(),
            reason: reason.into(),
        })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn execute(
        &self,
        request: &TranscodeRequest,
        on_stats: &StatsCallback,
    ) -> crate::Result<()> {
        if request.action == TranscodeAction::MergeOverlay && request.overlay.is_none() {
            return Err(Self::failed(request.action, "no overlay input"));
        }

        let args = self.build_args(request);
        tracing::debug!(
            action = %request.action,
            input = %request.input.display(),
            output = %request.output.display(),
            "Running ffmpeg"
        );

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        // Drain stderr concurrently so a chatty encoder cannot fill the pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut parser = StatsParser::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(stats) = parser.feed_line(&line) {
                    on_stats(&stats);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            let text = String::from_utf8_lossy(&stderr);
            let tail: Vec<&str> = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .rev()
                .take(STDERR_TAIL_LINES)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let reason = if tail.is_empty() {
                format!("ffmpeg exited with {}", status)
            } else {
                format!("ffmpeg exited with {}: {}", status, tail.join(" | "))
            };
            return Err(Self::failed(request.action, reason));
        }

        if !tokio::fs::try_exists(&request.output).await.unwrap_or(false) {
            return Err(Self::failed(
                request.action,
                format!("ffmpeg produced no output at {}", request.output.display()),
            ));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Seconds with millisecond precision, as ffmpeg expects for `-ss` / `-t`
fn seconds(duration: Duration) -> String {
    format!("{}.{:03}", duration.as_secs(), duration.subsec_millis())
}
