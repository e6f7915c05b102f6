//! Input unit fetchers.
//!
//! A [`MediaFetcher`] turns an [`InputMedia`] into a [`FetchSource`]: a byte stream
//! with a declared length, an in-memory payload or a file that already exists on
//! disk. [`FetchSource::into_asset`] then materializes the source as a file the rest
//! of the pipeline can work with, applying decryption and reporting progress the
//! same way for every kind of unit.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::crypto::StreamDecryptor;
use crate::error::{Error, Result};
use crate::types::{AssetFile, DecryptionSpec, InputMedia, MediaKind};
use crate::utils::decode_url_safe;

mod http;
mod stream;

pub use http::HttpFetcher;
pub use stream::stream_to_file;

/// Boxed byte stream produced by a fetcher
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Where the bytes of a unit come from
pub enum FetchSource {
    /// Streamed content; `declared_len` is 0 when the origin did not announce one
    Stream {
        /// Byte stream
        reader: BoxedReader,
        /// Announced length in bytes
        declared_len: u64,
    },
    /// Payload already held in memory
    Bytes(Vec<u8>),
    /// Existing file owned by the caller
    Local {
        /// Path to the file
        path: PathBuf,
        /// File size in bytes
        len: u64,
    },
}

impl std::fmt::Debug for FetchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchSource::Stream { declared_len, .. } => f
                .debug_struct("Stream")
                .field("declared_len", declared_len)
                .finish_non_exhaustive(),
            FetchSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            FetchSource::Local { path, len } => f
                .debug_struct("Local")
                .field("path", path)
                .field("len", len)
                .finish(),
        }
    }
}

impl FetchSource {
    /// Number of bytes the source is expected to deliver (0 if unknown)
    pub fn declared_len(&self) -> u64 {
        match self {
            FetchSource::Stream { declared_len, .. } => *declared_len,
            FetchSource::Bytes(bytes) => bytes.len() as u64,
            FetchSource::Local { len, .. } => *len,
        }
    }

    /// Write the source to `dest` (decrypting if needed) and return the resulting file
    ///
    /// Unencrypted local files are referenced in place and never copied. `on_chunk`
    /// receives the number of source bytes consumed each time data is written.
    pub async fn into_asset(
        self,
        dest: &Path,
        encryption: Option<&DecryptionSpec>,
        cancel: &CancellationToken,
        on_chunk: impl FnMut(u64) + Send,
    ) -> Result<AssetFile> {
        let mut on_chunk = on_chunk;
        let decryptor = StreamDecryptor::for_spec(encryption)?;

        match self {
            FetchSource::Stream { reader, .. } => {
                stream_to_file(reader, dest, decryptor, cancel, on_chunk).await?;
            }
            FetchSource::Bytes(bytes) => {
                stream_to_file(std::io::Cursor::new(bytes), dest, decryptor, cancel, on_chunk)
                    .await?;
            }
            FetchSource::Local { path, len } => {
                if !decryptor.is_encrypted() {
                    on_chunk(len);
                    return Ok(AssetFile::External(path));
                }
                let file = tokio::fs::File::open(&path).await?;
                stream_to_file(file, dest, decryptor, cancel, on_chunk).await?;
            }
        }

        Ok(AssetFile::Scratch(dest.to_path_buf()))
    }
}

/// Resolves opaque protocol tokens into byte streams
///
/// Implemented by the host application; the pipeline only knows how to decode the
/// token from the request.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Open the content behind `token`, returning the stream and its declared length
    async fn resolve(&self, token: &[u8]) -> Result<(BoxedReader, u64)>;
}

/// Opens input units
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Open a unit for reading
    async fn open(&self, unit: &InputMedia) -> Result<FetchSource>;
}

/// Fetcher handling every [`MediaKind`]
pub struct DefaultFetcher {
    http: HttpFetcher,
    resolver: Option<Arc<dyn ContentResolver>>,
}

impl DefaultFetcher {
    /// Create a fetcher without a protocol resolver
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(config)?,
            resolver: None,
        })
    }

    /// Attach the collaborator used for [`MediaKind::Protocol`] units
    pub fn with_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

#[async_trait]
impl MediaFetcher for DefaultFetcher {
    async fn open(&self, unit: &InputMedia) -> Result<FetchSource> {
        match unit.kind {
            MediaKind::Protocol => {
                let Some(resolver) = &self.resolver else {
                    return Err(Error::NotSupported(
                        "protocol media needs a content resolver".to_string(),
                    ));
                };
                let token = decode_url_safe(&unit.content)?;
                let (reader, declared_len) = resolver.resolve(&token).await?;
                Ok(FetchSource::Stream {
                    reader,
                    declared_len,
                })
            }
            MediaKind::RemoteUrl => self.http.open_url(&unit.content).await,
            MediaKind::InlineEncoded => Ok(FetchSource::Bytes(decode_url_safe(&unit.content)?)),
            MediaKind::LocalPath => {
                let path = PathBuf::from(&unit.content);
                let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
                    Error::Io(std::io::Error::new(
                        e.kind(),
                        format!("cannot read local media '{}': {}", path.display(), e),
                    ))
                })?;
                if !metadata.is_file() {
                    return Err(Error::NotFound(format!(
                        "local media '{}' is not a file",
                        path.display()
                    )));
                }
                Ok(FetchSource::Local {
                    path,
                    len: metadata.len(),
                })
            }
        }
    }
}
