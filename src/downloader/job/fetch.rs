//! Concurrent unit fetching -- one child task per unit, joined before assembly.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Error, Result};
use crate::fetch::MediaFetcher;
use crate::file_type::FileType;
use crate::types::{FetchedAsset, InputMedia};

use super::context::{JobContext, ProgressReporter};
use super::progress::ProgressTracker;

/// Fetch every unit concurrently into the job's scratch directory
///
/// Waits for all units before returning. Any failed unit fails the job with
/// [`DownloadError::FetchFailed`] (or [`DownloadError::Canceled`] when the job was
/// canceled). Assets are returned in request order.
pub(super) async fn fetch_units(ctx: &JobContext, units: &[InputMedia]) -> Result<Vec<FetchedAsset>> {
    let tracker = Arc::new(ProgressTracker::new(
        units.len(),
        ctx.downloader.config.download.progress_threshold_bytes,
    ));

    let mut set = JoinSet::new();
    for (index, unit) in units.iter().cloned().enumerate() {
        let unit_fetch = UnitFetch {
            index,
            unit,
            dest: ctx.scratch_path().join(format!("unit-{}", index)),
            fetcher: ctx.downloader.services.fetcher.clone(),
            tracker: tracker.clone(),
            reporter: ctx.reporter(),
            cancel: ctx.cancel.clone(),
        };
        set.spawn(async move { (index, unit_fetch.run().await) });
    }

    let mut fetched: Vec<(usize, FetchedAsset)> = Vec::with_capacity(units.len());
    let mut first_error: Option<Error> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(asset))) => {
                tracing::debug!(
                    task_id = ctx.id.0,
                    unit = index,
                    file_type = ?asset.file_type,
                    "Unit fetched"
                );
                fetched.push((index, asset));
            }
            Ok((index, Err(e))) => {
                if !e.is_canceled() {
                    tracing::warn!(task_id = ctx.id.0, unit = index, error = %e, "Unit fetch failed");
                }
                first_error.get_or_insert(if e.is_canceled() {
                    e
                } else {
                    Error::Download(DownloadError::FetchFailed {
                        unit: index,
                        reason: e.to_string(),
                    })
                });
            }
            Err(e) => {
                tracing::error!(task_id = ctx.id.0, error = %e, "Fetch task panicked");
                first_error.get_or_insert(Error::Other(format!("fetch task panicked: {}", e)));
            }
        }
    }

    if ctx.cancel.is_cancelled() {
        return Err(Error::Download(DownloadError::Canceled));
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    fetched.sort_by_key(|(index, _)| *index);
    Ok(fetched.into_iter().map(|(_, asset)| asset).collect())
}

/// Everything a child task needs to fetch one unit
struct UnitFetch {
    index: usize,
    unit: InputMedia,
    dest: PathBuf,
    fetcher: Arc<dyn MediaFetcher>,
    tracker: Arc<ProgressTracker>,
    reporter: ProgressReporter,
    cancel: CancellationToken,
}

impl UnitFetch {
    async fn run(self) -> Result<FetchedAsset> {
        let UnitFetch {
            index,
            unit,
            dest,
            fetcher,
            tracker,
            reporter,
            cancel,
        } = self;

        let source = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Download(DownloadError::Canceled)),
            source = fetcher.open(&unit) => source?,
        };
        tracker.add_declared(source.declared_len());

        let file = source
            .into_asset(&dest, unit.encryption.as_ref(), &cancel, |bytes| {
                tracker.advance(index, bytes, |percent| reporter.downloading(percent));
            })
            .await?;
        let file_type = FileType::detect(file.path()).await?;
        tracker.complete(index, |percent| reporter.downloading(percent));

        Ok(FetchedAsset {
            source: unit,
            file,
            file_type,
        })
    }
}
