//! Chunked streaming of a named file onto the outbound queue.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::{ByteSender, TransferError};

/// Streams `path` onto the outbound queue in `chunk_size` reads.
///
/// The file length is taken up front; the stream is complete only when
/// exactly that many bytes have been pushed. Failure to open, to read
/// the expected number of bytes, or to push a chunk aborts the whole
/// send. Returns the total bytes pushed.
///
/// This is the one place the protocol layer deliberately stalls on
/// storage and queue backpressure; it is invoked by the arbiter, not by
/// the pumps.
pub async fn send_file(
    path: &Path,
    outbound: &ByteSender,
    chunk_size: usize,
) -> Result<u64, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let expected = file.metadata().await?.len();

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;
    while sent < expected {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        outbound.push(buf[..n].to_vec()).await?;
        sent += n as u64;
    }

    if sent != expected {
        return Err(TransferError::ShortRead {
            expected,
            got: sent,
        });
    }

    tracing::debug!(path = %path.display(), bytes = sent, "file streamed to outbound queue");
    Ok(sent)
}
