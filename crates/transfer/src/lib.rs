//! Transfer pipeline: bounded byte queues and the long-lived pump tasks
//! bridging them to storage and the Bluetooth transport.
//!
//! The arbiter runs inside the transport's receive callback and must
//! never block on file or transport I/O. Everything that can stall goes
//! through one of the two queues and is drained by a pump task: the
//! receiver pump appends inbound payload to storage, the transmitter
//! pump hands outbound bytes to the transport. Queue pushes block when
//! the queue is full, so a slow disk or link backpressures the arbiter
//! instead of dropping data.

mod command;
mod queue;
mod send;

pub mod pumps;

pub use command::{TransferCommand, TransferDirection, TransferStatus};
pub use queue::{ByteReceiver, ByteSender, byte_queue};
pub use send::send_file;

use serde::{Deserialize, Serialize};

/// Default size of a file-read chunk pushed to the outbound queue.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default byte capacity of each queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8 * 1024;

/// One-shot byte sink over the Bluetooth serial link.
///
/// `send` either fully accepts the bytes or fails; there is no
/// partial-write retry at this layer.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, bytes: &[u8]) -> impl Future<Output = Result<(), TransferError>> + Send;
}

/// How the receiver pump persists inbound chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlushPolicy {
    /// Open, append, close for every chunk. A crash loses at most one
    /// in-flight chunk, at the cost of an open/close cycle per chunk.
    #[default]
    PerChunk,
    /// Keep the destination open across chunks and sync when the
    /// destination changes or the pipeline shuts down.
    Batched,
}

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue closed")]
    QueueClosed,

    #[error("chunk of {len} bytes can never fit queue capacity {capacity}")]
    ChunkTooLarge { len: usize, capacity: usize },

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: u64, got: u64 },

    #[error("transport error: {0}")]
    Transport(String),
}
