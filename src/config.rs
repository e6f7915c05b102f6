//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Fetch behavior configuration (scratch space, HTTP client, progress throttling)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root for per-job scratch directories (default: system temp dir)
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// User-Agent header sent with every remote fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Minimum bytes a unit must advance before a new progress notification is pushed
    /// (default: 1 MiB)
    #[serde(default = "default_progress_threshold")]
    pub progress_threshold_bytes: u64,

    /// Optional timeout for remote requests (None = wait indefinitely)
    #[serde(default)]
    pub request_timeout: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            user_agent: default_user_agent(),
            progress_threshold_bytes: default_progress_threshold(),
            request_timeout: None,
        }
    }
}

/// Encoder options handed to ffmpeg
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FfmpegOptions {
    /// Encoder thread count (None = ffmpeg decides)
    #[serde(default)]
    pub threads: Option<u32>,

    /// x264/x265 preset (default: "faster")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant rate factor (default: 23)
    #[serde(default = "default_crf")]
    pub constant_rate_factor: u32,

    /// Video bitrate in kbit/s (None = use CRF only)
    #[serde(default)]
    pub video_bitrate: Option<u32>,

    /// Audio bitrate in kbit/s (default: 128)
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,

    /// Video codec used when re-encoding (default: "libx264")
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Extra video filter appended to every video filter graph
    #[serde(default)]
    pub custom_video_filter: Option<String>,

    /// Extra arguments placed before the first input
    #[serde(default)]
    pub custom_input_args: Vec<String>,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            threads: None,
            preset: default_preset(),
            constant_rate_factor: default_crf(),
            video_bitrate: None,
            audio_bitrate: default_audio_bitrate(),
            video_codec: default_video_codec(),
            custom_video_filter: None,
            custom_input_args: Vec::new(),
        }
    }
}

/// External tool paths (ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Encoder options
    #[serde(default)]
    pub ffmpeg: FfmpegOptions,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
            ffmpeg: FfmpegOptions::default(),
        }
    }
}

/// Media handling options
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Convert voice notes to this audio format/extension before saving (e.g. "mp3")
    #[serde(default)]
    pub force_voice_note_format: Option<String>,

    /// Absolute prefix prepended to every `BaseURL` of a streamed playlist manifest
    #[serde(default = "default_cdn_base_url")]
    pub cdn_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            force_voice_note_format: None,
            cdn_base_url: default_cdn_base_url(),
        }
    }
}

/// Output location for the default local-directory sink
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Folder final artifacts are written under (default: "./downloads")
    #[serde(default = "default_save_folder")]
    pub save_folder: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_folder: default_save_folder(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./media-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig): scratch space, HTTP client, progress throttling
/// - [`tools`](ToolsConfig): ffmpeg discovery and encoder options
/// - [`media`](MediaConfig): voice note conversion, playlist CDN prefix
/// - [`output`](OutputConfig): where the default sink writes artifacts
/// - [`persistence`](PersistenceConfig): task registry database
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetch behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// External tool paths and options
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Media handling options
    #[serde(default)]
    pub media: MediaConfig,

    /// Output location
    #[serde(default)]
    pub output: OutputConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check settings that would otherwise fail deep inside a running job
    pub fn validate(&self) -> Result<()> {
        if self.download.user_agent.trim().is_empty() {
            return Err(Error::Config {
                message: "user agent must not be empty".to_string(),
                key: Some("user_agent".to_string()),
            });
        }
        if self.download.progress_threshold_bytes == 0 {
            return Err(Error::Config {
                message: "progress threshold must be at least 1 byte".to_string(),
                key: Some("progress_threshold_bytes".to_string()),
            });
        }
        if let Err(e) = url::Url::parse(&self.media.cdn_base_url) {
            return Err(Error::Config {
                message: format!("invalid CDN base URL: {}", e),
                key: Some("cdn_base_url".to_string()),
            });
        }
        if let Some(format) = &self.media.force_voice_note_format
            && (format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(Error::Config {
                message: format!("invalid voice note format '{}'", format),
                key: Some("force_voice_note_format".to_string()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("media-dl")
}

fn default_user_agent() -> String {
    format!("media-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_progress_threshold() -> u64 {
    1024 * 1024
}

fn default_preset() -> String {
    "faster".to_string()
}

fn default_crf() -> u32 {
    23
}

fn default_audio_bitrate() -> u32 {
    128
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_cdn_base_url() -> String {
    "https://cf-st.sc-cdn.net/d/".to_string()
}

fn default_save_folder() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("media-dl.db")
}

fn default_true() -> bool {
    true
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.download.progress_threshold_bytes, 1024 * 1024);
        assert_eq!(config.media.cdn_base_url, "https://cf-st.sc-cdn.net/d/");
        assert!(config.tools.search_path);
        assert_eq!(config.tools.ffmpeg.preset, "faster");
        assert!(config.download.request_timeout.is_none());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config: Config = serde_json::from_str(
            r#"{"media": {"force_voice_note_format": "mp3"}, "download": {"progress_threshold_bytes": 4096}}"#,
        )
        .unwrap();
        assert_eq!(config.media.force_voice_note_format.as_deref(), Some("mp3"));
        assert_eq!(config.download.progress_threshold_bytes, 4096);
        assert_eq!(config.media.cdn_base_url, "https://cf-st.sc-cdn.net/d/");
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = Config::default();
        config.download.progress_threshold_bytes = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("progress_threshold_bytes"))
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_voice_note_format_rejected() {
        let mut config = Config::default();
        config.media.force_voice_note_format = Some("../mp3".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_cdn_url_rejected() {
        let mut config = Config::default();
        config.media.cdn_base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
