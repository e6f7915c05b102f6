//! Task CRUD, dedup lookups and paged listings.

use crate::error::DatabaseError;
use crate::types::{SourceFilter, TaskId, TaskRecord, TaskStage};
use crate::{Error, Result};

use super::{Database, TaskRow};

impl Database {
    /// Insert a new task record
    ///
    /// Fails with [`DatabaseError::DuplicateKey`] when a row with the same dedup
    /// hash already exists.
    pub async fn insert_task(&self, record: &TaskRecord) -> Result<TaskId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (
                hash, output_path, output_file, author_label,
                source_tag, icon_ref, stage, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.dedup_hash)
        .bind(&record.metadata.output_path)
        .bind(&record.output_file)
        .bind(&record.metadata.author_label)
        .bind(&record.metadata.source_tag)
        .bind(&record.metadata.icon_ref)
        .bind(record.stage.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Database(DatabaseError::DuplicateKey(record.dedup_hash.clone()))
            }
            _ => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            ))),
        })?;

        Ok(TaskId(result.last_insert_rowid()))
    }

    /// Persist the stage and output file of an existing task
    pub async fn update_task(&self, record: &TaskRecord) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET stage = ?, output_file = ? WHERE id = ?")
            .bind(record.stage.as_str())
            .bind(&record.output_file)
            .bind(record.id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update task: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "task {} does not exist",
                record.id
            ))));
        }

        Ok(())
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT
                id, hash, output_path, output_file, author_label,
                source_tag, icon_ref, stage, created_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Find a task by its dedup hash
    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT
                id, hash, output_path, output_file, author_label,
                source_tag, icon_ref, stage, created_at
            FROM tasks
            WHERE hash = ?
            LIMIT 1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find task by hash: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Delete a task by ID, returning whether a row was removed
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a task by dedup hash, returning whether a row was removed
    pub async fn delete_by_hash(&self, hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task by hash: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every task
    pub async fn delete_all_tasks(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tasks")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete all tasks: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// List stored tasks with `id < before`, newest first
    ///
    /// `SourceFilter::Source(key)` keeps rows whose source tag ends with `key`;
    /// the other filters do not restrict stored rows.
    pub async fn query_tasks(
        &self,
        before: i64,
        limit: usize,
        filter: &SourceFilter,
    ) -> Result<Vec<TaskRow>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = match filter {
            SourceFilter::Source(key) if !key.is_empty() => {
                sqlx::query_as::<_, TaskRow>(
                    r#"
                    SELECT
                        id, hash, output_path, output_file, author_label,
                        source_tag, icon_ref, stage, created_at
                    FROM tasks
                    WHERE id < ? AND substr(source_tag, -length(?)) = ?
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(before)
                .bind(key)
                .bind(key)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            _ => {
                sqlx::query_as::<_, TaskRow>(
                    r#"
                    SELECT
                        id, hash, output_path, output_file, author_label,
                        source_tag, icon_ref, stage, created_at
                    FROM tasks
                    WHERE id < ?
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(before)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Count stored tasks
    pub async fn count_tasks(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count tasks: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    /// Mark every task a previous run left unfinished as failed
    ///
    /// Called once when the registry opens; returns the number of rows changed.
    pub async fn fail_interrupted_tasks(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE tasks SET stage = ? WHERE stage NOT IN (?, ?)")
            .bind(TaskStage::Failed.as_str())
            .bind(TaskStage::Success.as_str())
            .bind(TaskStage::Failed.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to reclassify interrupted tasks: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
