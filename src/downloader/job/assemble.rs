//! Post-fetch assembly: containers, overlay merge, playlist stitching, voice notes.

use std::path::Path;

use crate::assembly::{rewrite_base_urls, select_merge_pair, unpack_containers, with_type_extension};
use crate::error::{DownloadError, Error, Result};
use crate::file_type::FileType;
use crate::transcode::{TranscodeAction, TranscodeRequest, TranscodeStats};
use crate::types::{AssetFile, DownloadRequest, FetchedAsset, JobPhase, PlaylistOptions};

use super::context::JobContext;

/// Turn the fetched assets into the single file to commit
pub(super) async fn assemble(
    ctx: &JobContext,
    request: &DownloadRequest,
    assets: Vec<FetchedAsset>,
) -> Result<AssetFile> {
    ctx.enter_phase(JobPhase::Assembling);

    let (assets, unpacked) = unpack_containers(assets, ctx.scratch_path()).await?;
    if unpacked {
        tracing::debug!(task_id = ctx.id.0, assets = assets.len(), "Unpacked media container");
    }

    if request.merge_overlay || unpacked {
        merge_overlay(ctx, assets).await
    } else if request.is_streamed_playlist {
        stitch_playlist(ctx, assets, request.playlist_options).await
    } else {
        let mut assets = assets;
        let count = assets.len();
        match (assets.pop(), count) {
            (Some(asset), 1) => finish_single(ctx, asset).await,
            _ => Err(Error::Download(DownloadError::InvalidRequest(format!(
                "expected a single asset, got {}",
                count
            )))),
        }
    }
}

async fn merge_overlay(ctx: &JobContext, assets: Vec<FetchedAsset>) -> Result<AssetFile> {
    let (primary, overlay) = select_merge_pair(assets)?;
    ctx.ensure_active()?;

    let scratch = ctx.scratch_path();
    let input = with_type_extension(&primary, scratch, "media").await?;
    let overlay_input = with_type_extension(&overlay, scratch, "overlay").await?;
    let output = scratch.join("merged.mp4");

    let mut request = TranscodeRequest::new(TranscodeAction::MergeOverlay, input.clone(), output.clone());
    request.overlay = Some(overlay_input.clone());
    let result = transcode(ctx, request).await;

    remove_intermediate(&input).await;
    remove_intermediate(&overlay_input).await;
    result?;

    Ok(AssetFile::Scratch(output))
}

async fn stitch_playlist(
    ctx: &JobContext,
    assets: Vec<FetchedAsset>,
    options: Option<PlaylistOptions>,
) -> Result<AssetFile> {
    let manifest = match <[FetchedAsset; 1]>::try_from(assets) {
        Ok([manifest]) => manifest,
        Err(assets) => {
            return Err(Error::Download(DownloadError::MalformedPlaylist(format!(
                "expected one manifest, got {} assets",
                assets.len()
            ))));
        }
    };
    // Sniffing only sees the first bytes; the rewrite below validates the document
    if !matches!(manifest.file_type, FileType::Mpd | FileType::Unknown) {
        return Err(Error::Download(DownloadError::MalformedPlaylist(format!(
            "expected a DASH manifest, got {}",
            manifest.file_type.mime_type()
        ))));
    }

    let content = tokio::fs::read(manifest.file.path()).await?;
    let cdn = &ctx.downloader.config.media.cdn_base_url;
    let (rewritten, count) = rewrite_base_urls(&content, cdn)?;
    tracing::debug!(task_id = ctx.id.0, base_urls = count, "Rewrote playlist manifest");

    let scratch = ctx.scratch_path();
    let manifest_path = scratch.join("playlist.mpd");
    tokio::fs::write(&manifest_path, rewritten).await?;
    if manifest.file.is_scratch() {
        remove_intermediate(manifest.file.path()).await;
    }

    let output = scratch.join("playlist.mp4");
    let mut request = TranscodeRequest::new(
        TranscodeAction::PlaylistDownload,
        manifest_path.clone(),
        output.clone(),
    );
    if let Some(options) = options {
        request.start_time = options.offset;
        request.duration = options.length;
    }
    let result = transcode(ctx, request).await;
    remove_intermediate(&manifest_path).await;
    result?;

    Ok(AssetFile::Scratch(output))
}

/// A plain job commits its only asset, converting voice notes when configured
async fn finish_single(ctx: &JobContext, asset: FetchedAsset) -> Result<AssetFile> {
    let format = ctx.downloader.config.media.force_voice_note_format.as_deref();
    let Some(format) = format.filter(|_| asset.source.is_voice_note()) else {
        return Ok(asset.file);
    };

    let output = ctx.scratch_path().join(format!("voice_note.{}", format));
    let request = TranscodeRequest::new(
        TranscodeAction::AudioConvert,
        asset.file.path().to_path_buf(),
        output.clone(),
    );
    transcode(ctx, request).await?;

    if asset.file.is_scratch() {
        remove_intermediate(asset.file.path()).await;
    }
    Ok(AssetFile::Scratch(output))
}

/// Run the transcoder, aborting it when the job is canceled
async fn transcode(ctx: &JobContext, request: TranscodeRequest) -> Result<()> {
    ctx.ensure_active()?;
    ctx.enter_phase(JobPhase::Transcoding);

    let action = request.action;
    let reporter = ctx.reporter();
    let on_stats = move |stats: &TranscodeStats| {
        reporter.report(None, format!("{}: {}", action, stats.summary()));
    };
    let transcoder = &ctx.downloader.services.transcoder;
    tracing::info!(
        task_id = ctx.id.0,
        action = %action,
        transcoder = transcoder.name(),
        "Starting transcode"
    );

    // Dropping the transcode future stops the external process
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(Error::Download(DownloadError::Canceled)),
        result = transcoder.execute(&request, &on_stats) => result?,
    }

    if !tokio::fs::try_exists(&request.output).await.unwrap_or(false) {
        return Err(Error::Download(DownloadError::TranscodeFailed {
            action: action.to_string(),
            reason: "no output file was produced".to_string(),
        }));
    }
    Ok(())
}

async fn remove_intermediate(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "Failed to remove intermediate file");
    }
}
