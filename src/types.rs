//! Core types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DownloadError, Error, Result};
use crate::file_type::FileType;

/// Unique identifier for a task (the registry's primary key)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(
        value: sqlx::sqlite::SqliteValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Persisted lifecycle stage of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStage {
    /// Created, not yet started
    Pending,
    /// Job is running
    Running,
    /// Artifact committed
    Success,
    /// Job failed (or was interrupted by a restart)
    Failed,
    /// Job was canceled
    Canceled,
}

impl TaskStage {
    /// Stage name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStage::Pending => "PENDING",
            TaskStage::Running => "RUNNING",
            TaskStage::Success => "SUCCESS",
            TaskStage::Failed => "FAILED",
            TaskStage::Canceled => "CANCELED",
        }
    }

    /// Parse a stored stage name. Unknown names are treated as `Failed`.
    pub fn from_db(name: &str) -> Self {
        match name {
            "PENDING" => TaskStage::Pending,
            "RUNNING" => TaskStage::Running,
            "SUCCESS" => TaskStage::Success,
            "CANCELED" => TaskStage::Canceled,
            _ => TaskStage::Failed,
        }
    }

    /// No automatic transition leaves a terminal stage
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStage::Success | TaskStage::Failed | TaskStage::Canceled
        )
    }

    /// Whether a job owning this stage is still in flight
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run phase of a job, reported through [`Event::Phase`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Accepted, waiting for its task to start
    Queued,
    /// Units are being fetched concurrently
    Fetching,
    /// Archives are unpacked, overlays merged, manifests rewritten
    Assembling,
    /// External transcoder is running
    Transcoding,
    /// Final artifact is handed to the output sink
    Committing,
    /// Artifact committed
    Done,
    /// Job failed
    Failed,
    /// Job canceled
    Canceled,
}

/// How an input unit is obtained
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Opaque token resolved by the content-resolution collaborator
    Protocol,
    /// Plain HTTP(S) URL
    RemoteUrl,
    /// Payload embedded in the request as URL-safe base64
    InlineEncoded,
    /// Existing file on the local filesystem
    LocalPath,
}

/// AES-CBC parameters for an encrypted unit (both values standard base64)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecryptionSpec {
    /// Base64-encoded key (16, 24 or 32 bytes once decoded)
    pub key: String,
    /// Base64-encoded initialization vector (16 bytes once decoded)
    pub iv: String,
}

/// One fragment of a download job
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputMedia {
    /// How the unit is fetched
    pub kind: MediaKind,
    /// URL, token, payload or path depending on `kind`
    pub content: String,
    /// Decryption applied to the fetched stream
    #[serde(default)]
    pub encryption: Option<DecryptionSpec>,
    /// Whether this unit is the overlay track of a merge job
    #[serde(default)]
    pub is_overlay: bool,
    /// Attachment kind reported by the host (e.g. "NOTE" for voice notes)
    #[serde(default)]
    pub attachment_kind: Option<String>,
}

impl InputMedia {
    /// Unencrypted, non-overlay unit
    pub fn new(kind: MediaKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            encryption: None,
            is_overlay: false,
            attachment_kind: None,
        }
    }

    /// Mark this unit as the overlay track
    pub fn overlay(mut self) -> Self {
        self.is_overlay = true;
        self
    }

    /// Attach decryption parameters
    pub fn encrypted(mut self, spec: DecryptionSpec) -> Self {
        self.encryption = Some(spec);
        self
    }

    /// Set the attachment kind
    pub fn with_attachment_kind(mut self, kind: impl Into<String>) -> Self {
        self.attachment_kind = Some(kind.into());
        self
    }

    /// Whether the host flagged this unit as a voice note
    pub fn is_voice_note(&self) -> bool {
        self.attachment_kind
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case("NOTE"))
    }
}

/// Time window applied to a streamed playlist
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistOptions {
    /// Start offset (serialized as milliseconds)
    #[serde(default, with = "duration_millis")]
    pub offset: Option<Duration>,
    /// Length of the window (serialized as milliseconds)
    #[serde(default, with = "duration_millis")]
    pub length: Option<Duration>,
}

/// Full description of a job
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Units to fetch, in order
    pub input_media: Vec<InputMedia>,
    /// The sole unit is a DASH manifest
    #[serde(default)]
    pub is_streamed_playlist: bool,
    /// Trim window for playlist jobs
    #[serde(default)]
    pub playlist_options: Option<PlaylistOptions>,
    /// Composite an overlay unit onto the primary unit
    #[serde(default)]
    pub merge_overlay: bool,
}

impl DownloadRequest {
    /// Request with a single unit and no special handling
    pub fn single(unit: InputMedia) -> Self {
        Self {
            input_media: vec![unit],
            ..Default::default()
        }
    }

    /// Reject requests no job could ever complete
    pub fn validate(&self) -> Result<()> {
        if self.input_media.is_empty() {
            return Err(Error::Download(DownloadError::InvalidRequest(
                "request has no input media".to_string(),
            )));
        }
        if self.merge_overlay && self.input_media.len() != 2 {
            return Err(Error::Download(DownloadError::MalformedMergeInput {
                count: self.input_media.len(),
            }));
        }
        if self.is_streamed_playlist && self.input_media.len() != 1 {
            return Err(Error::Download(DownloadError::MalformedPlaylist(format!(
                "playlist jobs take exactly one manifest, got {} units",
                self.input_media.len()
            ))));
        }
        if !self.merge_overlay && !self.is_streamed_playlist && self.input_media.len() != 1 {
            return Err(Error::Download(DownloadError::InvalidRequest(format!(
                "plain jobs take exactly one unit, got {}",
                self.input_media.len()
            ))));
        }
        Ok(())
    }
}

/// Descriptive metadata attached to a job
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadMetadata {
    /// Logical identity of the content (hashed into the dedup key)
    #[serde(default)]
    pub content_identifier: Option<String>,
    /// Relative output path, without extension (e.g. "friends/alice/1700000000")
    pub output_path: String,
    /// Where the download came from (used for filtering)
    pub source_tag: String,
    /// Author shown in listings
    #[serde(default)]
    pub author_label: Option<String>,
    /// Icon shown in listings
    #[serde(default)]
    pub icon_ref: Option<String>,
}

impl DownloadMetadata {
    /// Dedup key for this content; a random identity is hashed when none is given
    pub fn dedup_hash(&self) -> String {
        match &self.content_identifier {
            Some(identifier) => crate::utils::dedup_hash(identifier),
            None => crate::utils::dedup_hash(&uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Human-readable task title
    pub fn title(&self) -> String {
        format!(
            "{} ({})",
            self.source_tag,
            self.author_label.as_deref().unwrap_or("unknown")
        )
    }
}

/// A task as seen by the registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Registry id (0 until the record is created)
    pub id: TaskId,
    /// Unique dedup key
    pub dedup_hash: String,
    /// Metadata snapshot
    pub metadata: DownloadMetadata,
    /// Reference returned by the output sink once committed
    pub output_file: Option<String>,
    /// Lifecycle stage
    pub stage: TaskStage,
}

impl TaskRecord {
    /// New pending record for the given metadata
    pub fn pending(dedup_hash: String, metadata: DownloadMetadata) -> Self {
        Self {
            id: TaskId(0),
            dedup_hash,
            metadata,
            output_file: None,
            stage: TaskStage::Pending,
        }
    }
}

/// Source filter for task listings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SourceFilter {
    /// Every task regardless of source
    #[default]
    All,
    /// Only tasks whose job is still in flight
    Pending,
    /// Tasks whose source tag ends with the given key
    Source(String),
}

impl SourceFilter {
    /// Whether a source tag passes this filter
    pub fn matches(&self, source_tag: &str) -> bool {
        match self {
            SourceFilter::All | SourceFilter::Pending => true,
            SourceFilter::Source(key) => source_tag.ends_with(key.as_str()),
        }
    }
}

/// Progress report pushed to the notifier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Task the report belongs to
    pub task_id: TaskId,
    /// Aggregate percentage, when known
    pub percent: Option<u8>,
    /// Human-readable status line
    pub message: String,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and task created
    Queued {
        /// Task ID
        id: TaskId,
        /// Task title
        title: String,
    },

    /// Job moved to a new phase
    Phase {
        /// Task ID
        id: TaskId,
        /// New phase
        phase: JobPhase,
    },

    /// Progress update
    Progress {
        /// Task ID
        id: TaskId,
        /// Aggregate percentage, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
        /// Status line
        message: String,
    },

    /// Artifact committed
    Completed {
        /// Task ID
        id: TaskId,
        /// Reference returned by the output sink
        output: String,
    },

    /// Job failed
    Failed {
        /// Task ID
        id: TaskId,
        /// Error message
        error: String,
    },

    /// Job canceled
    Canceled {
        /// Task ID
        id: TaskId,
    },

    /// Notifier callback failed; message that should have been shown
    Notice {
        /// Message text
        message: String,
    },
}

/// Serialize `Option<Duration>` as integer milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Location of a file produced or referenced by a job
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetFile {
    /// File inside the job's scratch directory; the pipeline deletes it
    Scratch(PathBuf),
    /// Caller-owned file referenced by a LOCAL_PATH unit; never deleted
    External(PathBuf),
}

impl AssetFile {
    /// Path on disk
    pub fn path(&self) -> &std::path::Path {
        match self {
            AssetFile::Scratch(p) | AssetFile::External(p) => p,
        }
    }

    /// Whether the pipeline owns (and must delete) this file
    pub fn is_scratch(&self) -> bool {
        matches!(self, AssetFile::Scratch(_))
    }
}

/// A unit that has been fetched (or split out of a container) and sniffed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedAsset {
    /// Unit the asset came from
    pub source: InputMedia,
    /// File holding the asset
    pub file: AssetFile,
    /// Detected type
    pub file_type: FileType,
}

impl FetchedAsset {
    /// Whether the asset is the overlay track of a merge
    pub fn is_overlay(&self) -> bool {
        self.source.is_overlay
    }
}
