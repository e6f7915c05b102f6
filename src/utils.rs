//! Utility functions for hashing, base64 payloads and path manipulation

use crate::error::{DownloadError, Error, Result};
use base64::Engine;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// URL-safe base64 that accepts payloads with or without trailing padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Standard base64 that accepts payloads with or without trailing padding
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// 64-bit polynomial string hash (`h = 31 * h + c` over UTF-16 code units, wrapping).
///
/// The value only depends on the input string, so it is stable across processes and
/// platforms.
pub fn long_hash_code(value: &str) -> i64 {
    value
        .encode_utf16()
        .fold(0i64, |h, c| h.wrapping_mul(31).wrapping_add(i64::from(c)))
}

/// Dedup key for a content identifier: absolute value of [`long_hash_code`] in lowercase hex
///
/// # Examples
///
/// ```
/// use media_dl::utils::dedup_hash;
///
/// assert_eq!(dedup_hash("a"), "61");
/// assert_eq!(dedup_hash("snap"), dedup_hash("snap"));
/// ```
pub fn dedup_hash(content_identifier: &str) -> String {
    format!("{:x}", long_hash_code(content_identifier).unsigned_abs())
}

/// Decode a URL-safe base64 payload (padding optional)
pub fn decode_url_safe(payload: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(payload.trim())
        .map_err(|e| Error::Other(format!("invalid url-safe base64 payload: {}", e)))
}

/// Decode a standard base64 value (padding optional)
pub fn decode_standard(value: &str) -> Result<Vec<u8>> {
    STANDARD_LENIENT
        .decode(value.trim())
        .map_err(|e| Error::Decryption(format!("invalid base64 value: {}", e)))
}

/// Get a path that does not exist yet, appending ` (1)`, ` (2)`, ... to the file stem
///
/// # Examples
///
/// ```
/// use media_dl::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/does-not-exist-media-dl/video.mp4");
/// assert_eq!(get_unique_path(path).unwrap(), path);
/// ```
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::Download(DownloadError::CommitFailed(format!(
            "cannot extract file stem from {}",
            path.display()
        )))
    })?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().ok_or_else(|| {
        Error::Download(DownloadError::CommitFailed(format!(
            "cannot extract parent directory from {}",
            path.display()
        )))
    })?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Download(DownloadError::CommitFailed(format!(
        "could not find unique filename for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    ))))
}

/// Split a relative output path into its folder segments and final file stem.
///
/// Empty, `.` and `..` segments are dropped so the result always stays below the
/// folder it is joined onto.
pub fn split_output_path(output_path: &str) -> (Vec<String>, String) {
    let mut segments: Vec<String> = output_path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(str::to_string)
        .collect();
    let stem = segments.pop().unwrap_or_else(|| "media".to_string());
    (segments, stem)
}
