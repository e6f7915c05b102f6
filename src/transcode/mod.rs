//! External transcoding
//!
//! This module provides a trait-based seam for the media conversions a job may need
//! after its units are fetched: converting a voice note, downloading a DASH playlist
//! window and compositing an overlay onto a video.
//!
//! ## Architecture
//!
//! - [`Transcoder`]: the interface the orchestrator calls
//! - [`FfmpegTranscoder`]: runs an external `ffmpeg` binary
//! - [`NoOpTranscoder`]: used when no binary is available; every request fails
//!   with `Error::NotSupported`
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::transcode::{FfmpegTranscoder, TranscodeAction, TranscodeRequest, Transcoder};
//! use media_dl::config::FfmpegOptions;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ffmpeg = FfmpegTranscoder::from_path(FfmpegOptions::default())
//!         .expect("ffmpeg binary not found");
//!
//!     let request = TranscodeRequest::new(
//!         TranscodeAction::AudioConvert,
//!         PathBuf::from("note.aac"),
//!         PathBuf::from("note.mp3"),
//!     );
//!     ffmpeg
//!         .execute(&request, &|stats| println!("{}", stats.summary()))
//!         .await?;
//!     Ok(())
//! }
//! ```

mod ffmpeg;
mod noop;
mod parser;
mod traits;

pub use ffmpeg::FfmpegTranscoder;
pub use noop::NoOpTranscoder;
pub use parser::StatsParser;
pub use traits::{StatsCallback, TranscodeAction, TranscodeRequest, TranscodeStats, Transcoder};
