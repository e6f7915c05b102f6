//! Streaming a unit into its scratch file.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::crypto::StreamDecryptor;
use crate::error::{DownloadError, Error, Result};

/// Read buffer size for unit transfers
const CHUNK_SIZE: usize = 64 * 1024;

/// Copy `reader` into a new file at `dest`, decrypting on the way
///
/// Cancellation is checked at every chunk boundary. `on_chunk` is called with the
/// number of source bytes consumed after each chunk is written. Returns the total
/// number of source bytes read.
pub async fn stream_to_file<R>(
    reader: R,
    dest: &Path,
    mut decryptor: StreamDecryptor,
    cancel: &CancellationToken,
    mut on_chunk: impl FnMut(u64),
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = reader;
    let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create '{}': {}", dest.display(), e),
        ))
    })?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Download(DownloadError::Canceled));
            }
            read = reader.read(&mut buffer) => read?,
        };
        if read == 0 {
            break;
        }

        let plain = decryptor.update(&buffer[..read]);
        if !plain.is_empty() {
            file.write_all(&plain).await?;
        }
        total += read as u64;
        on_chunk(read as u64);
    }

    let tail = decryptor.finish()?;
    if !tail.is_empty() {
        file.write_all(&tail).await?;
    }
    file.flush().await?;

    Ok(total)
}
