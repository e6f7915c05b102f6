//! Persistent task registry with deduplication.
//!
//! Every mutation (and the stale-record cleanup performed by [`TaskRegistry::lookup`])
//! is sent to a single writer task that owns all store writes. The writer keeps two
//! in-memory indices alongside the store: *active* tasks (stage not terminal) and
//! *completed* tasks seen during this run. Reads of those indices are synchronous.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot};

use crate::db::Database;
use crate::error::{DatabaseError, Error, Result};
use crate::types::{SourceFilter, TaskId, TaskRecord, TaskStage};

/// Default number of stored tasks returned per [`TaskRegistry::list_recent`] page
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Pending commands buffered for the writer
const COMMAND_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Lookup {
        hash: String,
        reply: Reply<Option<TaskStage>>,
    },
    Create {
        record: TaskRecord,
        reply: Reply<TaskId>,
    },
    Update {
        record: TaskRecord,
        reply: Reply<()>,
    },
    Remove {
        id: TaskId,
        reply: Reply<bool>,
    },
    RemoveAll {
        reply: Reply<()>,
    },
}

#[derive(Default)]
struct Indices {
    active: HashMap<TaskId, TaskRecord>,
    completed: HashMap<TaskId, TaskRecord>,
}

impl Indices {
    fn store(&mut self, record: TaskRecord) {
        if record.stage.is_terminal() {
            self.active.remove(&record.id);
            self.completed.insert(record.id, record);
        } else {
            self.completed.remove(&record.id);
            self.active.insert(record.id, record);
        }
    }

    fn forget(&mut self, id: TaskId) -> bool {
        let was_active = self.active.remove(&id).is_some();
        self.completed.remove(&id).is_some() || was_active
    }

    fn forget_hash(&mut self, hash: &str) {
        self.active.retain(|_, r| r.dedup_hash != hash);
        self.completed.retain(|_, r| r.dedup_hash != hash);
    }

    fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.active.get(&id).or_else(|| self.completed.get(&id))
    }
}

/// Handle to the task registry
///
/// Cheap to clone; all clones talk to the same writer.
#[derive(Clone)]
pub struct TaskRegistry {
    db: Arc<Database>,
    indices: Arc<RwLock<Indices>>,
    commands: mpsc::Sender<Command>,
}

impl TaskRegistry {
    /// Open (or create) the registry database at `path`
    ///
    /// Tasks a previous process left unfinished are reclassified as failed before
    /// the writer starts.
    pub async fn open(path: &Path) -> Result<Self> {
        let db = Database::new(path).await?;
        Self::with_database(db).await
    }

    /// Build a registry over an already opened database
    pub async fn with_database(db: Database) -> Result<Self> {
        let interrupted = db.fail_interrupted_tasks().await?;
        if interrupted > 0 {
            tracing::info!(
                count = interrupted,
                "Marked tasks interrupted by a previous run as failed"
            );
        }

        let db = Arc::new(db);
        let indices = Arc::new(RwLock::new(Indices::default()));
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        spawn_writer(db.clone(), indices.clone(), rx);

        Ok(Self {
            db,
            indices,
            commands: tx,
        })
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| Error::Database(DatabaseError::WriterClosed))?;
        rx.await
            .map_err(|_| Error::Database(DatabaseError::WriterClosed))?
    }

    /// Stage of the task with this dedup hash, if any
    ///
    /// A record whose stage is terminal but not `Success` is deleted as a side
    /// effect and reported as absent, so failed content can be submitted again.
    pub async fn lookup(&self, hash: &str) -> Result<Option<TaskStage>> {
        self.request(|reply| Command::Lookup {
            hash: hash.to_string(),
            reply,
        })
        .await
    }

    /// Insert a new record, returning its assigned id
    ///
    /// Fails with [`DatabaseError::DuplicateKey`] if the hash is already stored.
    pub async fn create(&self, record: TaskRecord) -> Result<TaskId> {
        self.request(|reply| Command::Create { record, reply }).await
    }

    /// Persist a record's stage and output file
    pub async fn update(&self, record: TaskRecord) -> Result<()> {
        self.request(|reply| Command::Update { record, reply }).await
    }

    /// Delete one task; returns whether anything was removed
    pub async fn remove(&self, id: TaskId) -> Result<bool> {
        self.request(|reply| Command::Remove { id, reply }).await
    }

    /// Delete every task
    pub async fn remove_all(&self) -> Result<()> {
        self.request(|reply| Command::RemoveAll { reply }).await
    }

    /// Recent tasks, newest first
    ///
    /// The first page (`page_before == None`) starts with the tasks still in
    /// flight. Stored tasks follow, continuing below the smallest id already
    /// returned. Pass the id of the last record of a page as `page_before` to
    /// fetch the next one.
    pub async fn list_recent(
        &self,
        filter: &SourceFilter,
        page_before: Option<TaskId>,
        page_size: usize,
    ) -> Result<Vec<TaskRecord>> {
        let mut tasks = Vec::new();
        if page_before.is_none() {
            tasks = self
                .active_tasks()
                .into_iter()
                .filter(|r| filter.matches(&r.metadata.source_tag))
                .collect();
        }

        if *filter == SourceFilter::Pending {
            return Ok(tasks);
        }

        let cursor = page_before
            .map(|id| id.0)
            .or_else(|| tasks.iter().map(|r| r.id.0).min())
            .unwrap_or(i64::MAX);

        let rows = self.db.query_tasks(cursor, page_size, filter).await?;
        let indices = self.indices.read().unwrap_or_else(PoisonError::into_inner);
        tasks.extend(rows.into_iter().map(|row| {
            // This run's view wins over the restart interpretation of the row
            indices
                .get(TaskId(row.id))
                .cloned()
                .unwrap_or_else(|| TaskRecord::from(row))
        }));

        Ok(tasks)
    }

    /// A single task by id
    pub async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        if let Some(record) = self
            .indices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Ok(Some(record.clone()));
        }
        Ok(self.db.get_task(id).await?.map(TaskRecord::from))
    }

    /// Tasks whose job is still in flight, newest first
    pub fn active_tasks(&self) -> Vec<TaskRecord> {
        let indices = self.indices.read().unwrap_or_else(PoisonError::into_inner);
        let mut tasks: Vec<TaskRecord> = indices.active.values().cloned().collect();
        tasks.sort_by(|a, b| b.id.cmp(&a.id));
        tasks
    }

    /// Whether no job is in flight
    pub fn is_empty(&self) -> bool {
        self.indices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .is_empty()
    }
}

/// Spawn the single writer that applies registry commands in arrival order.
///
/// The writer exits once every [`TaskRegistry`] handle has been dropped.
fn spawn_writer(
    db: Arc<Database>,
    indices: Arc<RwLock<Indices>>,
    mut rx: mpsc::Receiver<Command>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Lookup { hash, reply } => {
                    let _ = reply.send(apply_lookup(&db, &indices, &hash).await);
                }
                Command::Create { mut record, reply } => {
                    let result = match db.insert_task(&record).await {
                        Ok(id) => {
                            record.id = id;
                            write_indices(&indices).store(record);
                            Ok(id)
                        }
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }
                Command::Update { record, reply } => {
                    let result = db.update_task(&record).await;
                    if result.is_ok() {
                        write_indices(&indices).store(record);
                    }
                    let _ = reply.send(result);
                }
                Command::Remove { id, reply } => {
                    let result = db.delete_task(id).await.map(|deleted| {
                        let forgotten = write_indices(&indices).forget(id);
                        deleted || forgotten
                    });
                    let _ = reply.send(result);
                }
                Command::RemoveAll { reply } => {
                    let result = db.delete_all_tasks().await.map(|count| {
                        let mut indices = write_indices(&indices);
                        indices.active.clear();
                        indices.completed.clear();
                        tracing::debug!(count, "Removed all tasks");
                    });
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("Task registry writer stopped");
    })
}

fn write_indices(indices: &RwLock<Indices>) -> std::sync::RwLockWriteGuard<'_, Indices> {
    indices.write().unwrap_or_else(PoisonError::into_inner)
}

async fn apply_lookup(
    db: &Database,
    indices: &RwLock<Indices>,
    hash: &str,
) -> Result<Option<TaskStage>> {
    let Some(row) = db.find_by_hash(hash).await? else {
        return Ok(None);
    };

    // Interrupted rows were already rewritten to FAILED on open, so a stored
    // non-terminal stage belongs to a job of this run.
    let stage = TaskStage::from_db(&row.stage);
    if stage.is_terminal() && stage != TaskStage::Success {
        db.delete_by_hash(hash).await?;
        write_indices(indices).forget_hash(hash);
        tracing::debug!(task_id = row.id, stage = %stage, "Purged stale task on lookup");
        return Ok(None);
    }

    Ok(Some(stage))
}
