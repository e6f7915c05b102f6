//! Job orchestration -- top-level lifecycle for a single job.

use crate::error::Result;
use crate::types::{DownloadRequest, JobPhase};

use super::assemble::assemble;
use super::context::JobContext;
use super::fetch::fetch_units;
use super::finalization::{commit, finalize_job};

/// Core job task -- orchestrates the full lifecycle of a single download.
///
/// Phases:
/// 1. Fetch all units concurrently (join barrier)
/// 2. Assemble: unpack containers, merge overlays, stitch playlists, convert voice notes
/// 3. Commit the artifact through the output sink
/// 4. Record the terminal stage and clean up
///
/// Cancellation is checked after fetching, before every transcode and before commit.
pub(crate) async fn run_job(ctx: JobContext, request: DownloadRequest) {
    let outcome = execute(&ctx, &request).await;
    finalize_job(ctx, outcome).await;
}

async fn execute(ctx: &JobContext, request: &DownloadRequest) -> Result<String> {
    ctx.enter_phase(JobPhase::Fetching);
    let assets = fetch_units(ctx, &request.input_media).await?;
    ctx.ensure_active()?;

    let artifact = assemble(ctx, request, assets).await?;
    ctx.ensure_active()?;

    commit(ctx, &artifact).await
}
