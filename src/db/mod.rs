//! Database layer for media-dl
//!
//! Handles SQLite persistence for the task registry.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`tasks`]: Task CRUD, dedup lookups and paged listings

use crate::types::{DownloadMetadata, TaskId, TaskRecord, TaskStage};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod tasks;

/// Task record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    /// Unique database ID
    pub id: i64,
    /// Dedup key (unique)
    pub hash: String,
    /// Relative output path the artifact is committed under
    pub output_path: String,
    /// Reference returned by the output sink
    pub output_file: Option<String>,
    /// Author shown in listings
    pub author_label: Option<String>,
    /// Where the download came from
    pub source_tag: String,
    /// Icon shown in listings
    pub icon_ref: Option<String>,
    /// Stage name (upper-case)
    pub stage: String,
    /// Unix timestamp when the task was created
    pub created_at: i64,
}

impl From<TaskRow> for TaskRecord {
    /// Rows read back are interpreted under the restart rule: anything not
    /// committed by a previous run counts as failed.
    fn from(row: TaskRow) -> Self {
        let stage = match TaskStage::from_db(&row.stage) {
            TaskStage::Success => TaskStage::Success,
            _ => TaskStage::Failed,
        };

        TaskRecord {
            id: TaskId(row.id),
            dedup_hash: row.hash,
            metadata: DownloadMetadata {
                content_identifier: None,
                output_path: row.output_path,
                source_tag: row.source_tag,
                author_label: row.author_label,
                icon_ref: row.icon_ref,
            },
            output_file: row.output_file,
            stage,
        }
    }
}

/// Database handle for media-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
