//! Media type sniffing from file headers.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected when sniffing
const SNIFF_LEN: usize = 256;

/// File type detected from magic bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// GIF image
    Gif,
    /// PNG image
    Png,
    /// JPEG image
    Jpg,
    /// WebP image
    Webp,
    /// MPEG-4 container (ISO base media)
    Mp4,
    /// Matroska / WebM container
    Mkv,
    /// MPEG audio layer 3
    Mp3,
    /// ADTS AAC audio
    Aac,
    /// Ogg container
    Ogg,
    /// RIFF WAVE audio
    Wav,
    /// ZIP archive (split media container)
    Zip,
    /// DASH manifest
    Mpd,
    /// Anything else
    Unknown,
}

impl FileType {
    /// Detect the type of a file on disk
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut header = [0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            let n = file.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(Self::from_header(&header[..filled]))
    }

    /// [`FileType::from_file`] on the blocking pool
    pub async fn detect(path: &Path) -> crate::Result<Self> {
        let path = path.to_path_buf();
        let file_type = tokio::task::spawn_blocking(move || Self::from_file(&path))
            .await
            .map_err(|e| crate::Error::Other(format!("file type detection panicked: {}", e)))??;
        Ok(file_type)
    }

    /// Detect the type from the leading bytes of a file
    pub fn from_header(header: &[u8]) -> Self {
        let starts = |magic: &[u8]| header.starts_with(magic);

        if starts(b"GIF87a") || starts(b"GIF89a") {
            FileType::Gif
        } else if starts(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]) {
            FileType::Png
        } else if starts(&[0xff, 0xd8, 0xff]) {
            FileType::Jpg
        } else if starts(b"RIFF") && header.get(8..12) == Some(b"WEBP".as_slice()) {
            FileType::Webp
        } else if starts(b"RIFF") && header.get(8..12) == Some(b"WAVE".as_slice()) {
            FileType::Wav
        } else if header.get(4..8) == Some(b"ftyp".as_slice()) {
            FileType::Mp4
        } else if starts(&[0x1a, 0x45, 0xdf, 0xa3]) {
            FileType::Mkv
        } else if starts(b"ID3") || (header.len() >= 2 && header[0] == 0xff && header[1] & 0xe6 == 0xe2)
        {
            FileType::Mp3
        } else if header.len() >= 2 && header[0] == 0xff && header[1] & 0xf6 == 0xf0 {
            FileType::Aac
        } else if starts(b"OggS") {
            FileType::Ogg
        } else if starts(b"PK\x03\x04") || starts(b"PK\x05\x06") {
            FileType::Zip
        } else if is_mpd_header(header) {
            FileType::Mpd
        } else {
            FileType::Unknown
        }
    }

    /// Canonical file extension (without dot)
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Gif => "gif",
            FileType::Png => "png",
            FileType::Jpg => "jpg",
            FileType::Webp => "webp",
            FileType::Mp4 => "mp4",
            FileType::Mkv => "mkv",
            FileType::Mp3 => "mp3",
            FileType::Aac => "aac",
            FileType::Ogg => "ogg",
            FileType::Wav => "wav",
            FileType::Zip => "zip",
            FileType::Mpd => "mpd",
            FileType::Unknown => "dat",
        }
    }

    /// MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Gif => "image/gif",
            FileType::Png => "image/png",
            FileType::Jpg => "image/jpeg",
            FileType::Webp => "image/webp",
            FileType::Mp4 => "video/mp4",
            FileType::Mkv => "video/x-matroska",
            FileType::Mp3 => "audio/mpeg",
            FileType::Aac => "audio/aac",
            FileType::Ogg => "audio/ogg",
            FileType::Wav => "audio/wav",
            FileType::Zip => "application/zip",
            FileType::Mpd => "application/dash+xml",
            FileType::Unknown => "application/octet-stream",
        }
    }

    /// Still image
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            FileType::Gif | FileType::Png | FileType::Jpg | FileType::Webp
        )
    }

    /// Video container
    pub fn is_video(&self) -> bool {
        matches!(self, FileType::Mp4 | FileType::Mkv)
    }

    /// Audio-only format
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            FileType::Mp3 | FileType::Aac | FileType::Ogg | FileType::Wav
        )
    }
}

fn is_mpd_header(header: &[u8]) -> bool {
    let text = String::from_utf8_lossy(header);
    let mut rest = text.trim_start_matches('\u{feff}').trim_start();
    // Skip the prolog, processing instructions and comments before the root element
    loop {
        let close = if rest.starts_with("<?") {
            "?>"
        } else if rest.starts_with("<!--") {
            "-->"
        } else {
            break;
        };
        match rest.find(close) {
            Some(end) => rest = rest[end + close.len()..].trim_start(),
            None => return false,
        }
    }
    let Some(root) = rest.strip_prefix('<') else {
        return false;
    };
    let name_end = root
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(root.len());
    let name = &root[..name_end];
    name == "MPD" || name.rsplit_once(':').is_some_and(|(_, local)| local == "MPD")
}
