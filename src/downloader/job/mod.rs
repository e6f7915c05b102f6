//! Job execution -- the lifecycle of a single download.
//!
//! Split into focused submodules:
//! - [`context`] - Per-job state: task record, cancellation, scratch directory
//! - [`progress`] - Aggregated fetch progress across units
//! - [`fetch`] - Concurrent unit fetching behind a join barrier
//! - [`assemble`] - Container unpacking, overlay merge, playlist stitching, voice notes
//! - [`finalization`] - Commit and terminal stage
//! - [`orchestration`] - Top-level sequencing of the phases

mod assemble;
mod context;
mod fetch;
mod finalization;
mod orchestration;
mod progress;

pub(crate) use context::JobContext;
pub(crate) use orchestration::run_job;
