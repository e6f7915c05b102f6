//! Split-media containers delivered as ZIP archives.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{DownloadError, Error, Result};
use crate::file_type::FileType;

/// Entry names starting with this prefix are overlay tracks
const OVERLAY_PREFIX: &str = "overlay";

/// One media element unpacked from a container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitEntry {
    /// Unpacked file
    pub path: PathBuf,
    /// Whether the entry is the overlay track
    pub is_overlay: bool,
    /// Type sniffed from the unpacked bytes
    pub file_type: FileType,
}

fn archive_error(archive: &Path, reason: String) -> Error {
    Error::Download(DownloadError::ArchiveFailed {
        archive: archive.to_path_buf(),
        reason,
    })
}

/// Unpack every file entry of `archive_path` into `dest_dir`
///
/// Entries are written as `split-<index>` so archive-controlled names never reach
/// the filesystem. Directory entries are skipped. This is blocking I/O; run it
/// with `spawn_blocking`.
pub fn split_archive(archive_path: &Path, dest_dir: &Path) -> Result<Vec<SplitEntry>> {
    debug!(?archive_path, ?dest_dir, "splitting media container");

    let file = std::fs::File::open(archive_path)
        .map_err(|e| archive_error(archive_path, format!("failed to open archive: {}", e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| archive_error(archive_path, format!("failed to read archive: {}", e)))?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            archive_error(archive_path, format!("failed to read entry {}: {}", index, e))
        })?;
        if entry.is_dir() {
            continue;
        }

        let Some(name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_lowercase())
        else {
            warn!(index, "skipping entry with unsafe path");
            continue;
        };

        let path = dest_dir.join(format!("split-{}", index));
        let mut out = std::fs::File::create(&path)?;
        std::io::copy(&mut entry, &mut out).map_err(|e| {
            archive_error(archive_path, format!("failed to unpack '{}': {}", name, e))
        })?;
        drop(out);

        let file_type = FileType::from_file(&path)?;
        entries.push(SplitEntry {
            path,
            is_overlay: name.starts_with(OVERLAY_PREFIX),
            file_type,
        });
    }

    if entries.is_empty() {
        return Err(archive_error(
            archive_path,
            "archive contains no media".to_string(),
        ));
    }

    debug!(count = entries.len(), "container split");
    Ok(entries)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Write a ZIP archive with the given (name, bytes) entries
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_split_tags_overlay_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(
            &archive,
            &[
                ("media~1234", b"\x00\x00\x00\x18ftypmp42rest".as_slice()),
                ("overlay~1234", b"\x89PNG\r\n\x1a\nrest".as_slice()),
            ],
        );

        let entries = split_archive(&archive, dir.path()).unwrap();
        assert_eq!(entries.len(), 2);

        let media = entries.iter().find(|e| !e.is_overlay).unwrap();
        let overlay = entries.iter().find(|e| e.is_overlay).unwrap();
        assert_eq!(media.file_type, FileType::Mp4);
        assert_eq!(overlay.file_type, FileType::Png);
        assert!(media.path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&overlay.path).unwrap(), b"\x89PNG\r\n\x1a\nrest");
    }

    #[test]
    fn test_directories_are_skipped_and_names_not_trusted() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.zip");
        {
            let file = std::fs::File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::FileOptions::default();
            zip.add_directory("nested/", options).unwrap();
            zip.start_file("nested/Overlay.webp", options).unwrap();
            zip.write_all(b"RIFF\x00\x00\x00\x00WEBPVP8 ").unwrap();
            zip.finish().unwrap();
        }

        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let entries = split_archive(&archive, &out).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_overlay);
        assert_eq!(entries[0].file_type, FileType::Webp);
        assert_eq!(entries[0].path.parent().unwrap(), out.as_path());
    }

    #[test]
    fn test_not_a_zip_fails() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bogus.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        let err = split_archive(&archive, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Download(DownloadError::ArchiveFailed { .. })
        ));
    }

    #[test]
    fn test_empty_archive_fails() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("empty.zip");
        write_zip(&archive, &[]);
        assert!(split_archive(&archive, dir.path()).is_err());
    }
}
