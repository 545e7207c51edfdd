//! Offset-addressed segment copying.
//!
//! [`copy_segment`] moves exactly `length` bytes from a source stream to a
//! destination stream through one reusable buffer. Memory use is bounded by
//! the buffer size regardless of segment size.

use std::io::{self, SeekFrom};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Segment copy failures
#[derive(Debug, Error)]
pub enum CopyError {
    /// Read, write or seek failed, including short reads
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The cancellation token was set between blocks
    #[error("copy cancelled")]
    Cancelled,
}

/// Copy `length` bytes from `source` to `destination`.
///
/// The source is read from its current position. With `dest_offset`, the
/// destination is seeked to `dest_offset + copied` before every write, so
/// the call never depends on where another handle left the file cursor.
/// Without it, bytes are written from the destination's current position.
///
/// The copy runs as `length / buf_len` full blocks plus one remainder
/// block, where `buf_len = min(buffer_size, length)`. The token is checked
/// before each block. When `progress` is given it receives
/// `completed_blocks / total_blocks` before each block, so `1.0` is never
/// reported.
///
/// Returns the number of bytes copied, which always equals `length`.
///
/// # Errors
///
/// - [`CopyError::Cancelled`] if the token is set before a block starts
/// - [`CopyError::Io`] on any I/O failure; a source that ends early fails
///   with [`io::ErrorKind::UnexpectedEof`]
pub async fn copy_segment<R, W>(
    source: &mut R,
    destination: &mut W,
    dest_offset: Option<u64>,
    length: u64,
    buffer_size: usize,
    progress: Option<&(dyn Fn(f64) + Send + Sync)>,
    cancel: &CancellationToken,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + AsyncSeek + Unpin + ?Sized,
{
    if buffer_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "buffer size must be greater than zero",
        )
        .into());
    }
    if length == 0 {
        return Ok(0);
    }

    let buf_len = length.min(buffer_size as u64);
    let full_blocks = length / buf_len;
    let last_block = length % buf_len;
    let total_blocks = full_blocks + u64::from(last_block != 0);

    // buf_len <= buffer_size, so the cast is lossless
    let mut buffer = vec![0u8; buf_len as usize];
    let mut copied = 0u64;

    for block in 0..total_blocks {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }

        if let Some(report) = progress {
            report(block as f64 / total_blocks as f64);
        }

        let len = if block < full_blocks {
            buffer.len()
        } else {
            last_block as usize
        };
        let chunk = &mut buffer[..len];

        source.read_exact(chunk).await?;

        if let Some(offset) = dest_offset {
            destination.seek(SeekFrom::Start(offset + copied)).await?;
        }
        destination.write_all(chunk).await?;

        copied += len as u64;
    }

    destination.flush().await?;

    Ok(copied)
}
