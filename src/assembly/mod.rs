//! Assembly of fetched units into a single artifact.
//!
//! - [`archive`] splits ZIP containers into their media and overlay tracks
//! - [`playlist`] rewrites DASH manifests so segments resolve against the CDN
//!
//! The helpers here operate on [`FetchedAsset`]s inside a job's scratch directory.

pub mod archive;
pub mod playlist;

use std::path::{Path, PathBuf};

use crate::error::{DownloadError, Error, Result};
use crate::file_type::FileType;
use crate::types::{AssetFile, FetchedAsset};

pub use archive::{SplitEntry, split_archive};
pub use playlist::rewrite_base_urls;

/// Replace every ZIP asset by the media tracks it contains
///
/// Returns the new asset list and whether any container was found. Unpacked
/// containers that live in scratch are deleted.
pub async fn unpack_containers(
    assets: Vec<FetchedAsset>,
    scratch: &Path,
) -> Result<(Vec<FetchedAsset>, bool)> {
    let mut unpacked = Vec::with_capacity(assets.len());
    let mut found = false;

    for asset in assets {
        if asset.file_type != FileType::Zip {
            unpacked.push(asset);
            continue;
        }
        found = true;

        let archive_path = asset.file.path().to_path_buf();
        let dest = scratch.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || split_archive(&archive_path, &dest))
            .await
            .map_err(|e| Error::Other(format!("archive task panicked: {}", e)))??;

        if asset.file.is_scratch() {
            tokio::fs::remove_file(asset.file.path()).await?;
        }

        unpacked.extend(entries.into_iter().map(|entry| {
            let mut source = asset.source.clone();
            source.is_overlay = entry.is_overlay;
            FetchedAsset {
                source,
                file: AssetFile::Scratch(entry.path),
                file_type: entry.file_type,
            }
        }));
    }

    Ok((unpacked, found))
}

/// Pick the primary and overlay assets of a merge job
///
/// Exactly two assets, exactly one of them an overlay.
pub fn select_merge_pair(assets: Vec<FetchedAsset>) -> Result<(FetchedAsset, FetchedAsset)> {
    let count = assets.len();
    let overlays = assets.iter().filter(|a| a.is_overlay()).count();
    if count != 2 || overlays != 1 {
        return Err(Error::Download(DownloadError::MalformedMergeInput { count }));
    }

    let (overlay, primary): (Vec<_>, Vec<_>) = assets.into_iter().partition(|a| a.is_overlay());
    match (primary.into_iter().next(), overlay.into_iter().next()) {
        (Some(primary), Some(overlay)) => Ok((primary, overlay)),
        _ => Err(Error::Download(DownloadError::MalformedMergeInput { count })),
    }
}

/// Give an asset a file name with its type's extension inside `scratch`
///
/// Scratch files are moved; caller-owned files are copied so they are never
/// modified.
pub async fn with_type_extension(asset: &FetchedAsset, scratch: &Path, stem: &str) -> Result<PathBuf> {
    let target = scratch.join(format!("{}.{}", stem, asset.file_type.extension()));
    match &asset.file {
        AssetFile::Scratch(path) => tokio::fs::rename(path, &target).await?,
        AssetFile::External(path) => {
            tokio::fs::copy(path, &target).await?;
        }
    }
    Ok(target)
}
