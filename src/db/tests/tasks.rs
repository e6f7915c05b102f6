use crate::db::*;
use crate::error::{DatabaseError, Error};
use crate::types::{DownloadMetadata, SourceFilter, TaskId, TaskRecord, TaskStage};
use tempfile::NamedTempFile;

fn record(hash: &str, source_tag: &str) -> TaskRecord {
    TaskRecord::pending(
        hash.to_string(),
        DownloadMetadata {
            content_identifier: None,
            output_path: format!("friends/alice/{}", hash),
            source_tag: source_tag.to_string(),
            author_label: Some("alice".to_string()),
            icon_ref: None,
        },
    )
}

#[tokio::test]
async fn test_insert_and_find_by_hash() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let id = db.insert_task(&record("h1", "chat")).await.unwrap();
    assert!(id.0 > 0);

    let row = db.find_by_hash("h1").await.unwrap().unwrap();
    assert_eq!(row.id, id.0);
    assert_eq!(row.stage, "PENDING");
    assert_eq!(row.output_path, "friends/alice/h1");
    assert_eq!(row.author_label.as_deref(), Some("alice"));
    assert!(row.created_at > 0);

    assert!(db.find_by_hash("missing").await.unwrap().is_none());
    db.close().await;
}

#[tokio::test]
async fn test_duplicate_hash_is_rejected() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.insert_task(&record("dup", "chat")).await.unwrap();
    let err = db.insert_task(&record("dup", "story")).await.unwrap_err();
    assert!(
        matches!(err, Error::Database(DatabaseError::DuplicateKey(ref h)) if h == "dup"),
        "unexpected error: {:?}",
        err
    );
    db.close().await;
}

#[tokio::test]
async fn test_update_task_persists_stage_and_output() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut task = record("h1", "chat");
    task.id = db.insert_task(&task).await.unwrap();
    task.stage = TaskStage::Success;
    task.output_file = Some("/downloads/clip.mp4".to_string());
    db.update_task(&task).await.unwrap();

    let row = db.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(row.stage, "SUCCESS");
    assert_eq!(row.output_file.as_deref(), Some("/downloads/clip.mp4"));

    let mut ghost = record("ghost", "chat");
    ghost.id = TaskId(9999);
    assert!(matches!(
        db.update_task(&ghost).await,
        Err(Error::Database(DatabaseError::NotFound(_)))
    ));
    db.close().await;
}

#[tokio::test]
async fn test_delete_operations() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let id = db.insert_task(&record("a", "chat")).await.unwrap();
    db.insert_task(&record("b", "chat")).await.unwrap();
    db.insert_task(&record("c", "chat")).await.unwrap();

    assert!(db.delete_task(id).await.unwrap());
    assert!(!db.delete_task(id).await.unwrap());
    assert!(db.delete_by_hash("b").await.unwrap());
    assert_eq!(db.count_tasks().await.unwrap(), 1);

    assert_eq!(db.delete_all_tasks().await.unwrap(), 1);
    assert_eq!(db.count_tasks().await.unwrap(), 0);
    db.close().await;
}

#[tokio::test]
async fn test_query_tasks_pages_newest_first() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            db.insert_task(&record(&format!("h{}", i), "chat"))
                .await
                .unwrap(),
        );
    }

    let first = db.query_tasks(i64::MAX, 2, &SourceFilter::All).await.unwrap();
    assert_eq!(
        first.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![ids[4].0, ids[3].0]
    );

    let cursor = first.last().unwrap().id;
    let second = db.query_tasks(cursor, 10, &SourceFilter::All).await.unwrap();
    assert_eq!(
        second.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![ids[2].0, ids[1].0, ids[0].0]
    );
    db.close().await;
}

#[tokio::test]
async fn test_query_tasks_source_suffix_filter() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.insert_task(&record("a", "chat_media")).await.unwrap();
    db.insert_task(&record("b", "story")).await.unwrap();
    db.insert_task(&record("c", "public_story")).await.unwrap();

    let stories = db
        .query_tasks(i64::MAX, 30, &SourceFilter::Source("story".to_string()))
        .await
        .unwrap();
    let hashes: Vec<_> = stories.iter().map(|r| r.hash.as_str()).collect();
    assert_eq!(hashes, vec!["c", "b"]);

    // Suffix match is exact, not a LIKE pattern
    let none = db
        .query_tasks(i64::MAX, 30, &SourceFilter::Source("%".to_string()))
        .await
        .unwrap();
    assert!(none.is_empty());

    let everything = db
        .query_tasks(i64::MAX, 30, &SourceFilter::Source(String::new()))
        .await
        .unwrap();
    assert_eq!(everything.len(), 3);
    db.close().await;
}

#[tokio::test]
async fn test_fail_interrupted_tasks() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut done = record("done", "chat");
    done.id = db.insert_task(&done).await.unwrap();
    done.stage = TaskStage::Success;
    db.update_task(&done).await.unwrap();

    let mut running = record("running", "chat");
    running.id = db.insert_task(&running).await.unwrap();
    running.stage = TaskStage::Running;
    db.update_task(&running).await.unwrap();

    db.insert_task(&record("pending", "chat")).await.unwrap();

    assert_eq!(db.fail_interrupted_tasks().await.unwrap(), 2);

    let stages: Vec<(String, String)> =
        sqlx::query_as("SELECT hash, stage FROM tasks ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert_eq!(
        stages,
        vec![
            ("done".to_string(), "SUCCESS".to_string()),
            ("running".to_string(), "FAILED".to_string()),
            ("pending".to_string(), "FAILED".to_string()),
        ]
    );
    db.close().await;
}

#[tokio::test]
async fn test_row_conversion_applies_restart_rule() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut canceled = record("x", "chat");
    canceled.id = db.insert_task(&canceled).await.unwrap();
    canceled.stage = TaskStage::Canceled;
    db.update_task(&canceled).await.unwrap();

    let row = db.find_by_hash("x").await.unwrap().unwrap();
    let restored = TaskRecord::from(row);
    assert_eq!(restored.stage, TaskStage::Failed);
    assert_eq!(restored.metadata.source_tag, "chat");
    assert_eq!(restored.dedup_hash, "x");
    db.close().await;
}
