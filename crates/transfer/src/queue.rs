//! Bounded byte queue with blocking push and pop.
//!
//! Capacity is denominated in bytes, not chunks: a push suspends until
//! the queue holds enough free bytes for the whole chunk, so producers
//! experience backpressure and no data is ever dropped. Chunk
//! boundaries are preserved across the queue, but the queue guarantees
//! only FIFO byte order and the capacity bound; any framing on top is
//! the pipeline's concern.
//!
//! One producer, one consumer. Created once at pipeline start and
//! lives for the process lifetime.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};

use crate::TransferError;

/// Creates a byte queue with the given byte capacity.
pub fn byte_queue(capacity: usize) -> (ByteSender, ByteReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let budget = Arc::new(Semaphore::new(capacity));
    (
        ByteSender {
            tx,
            budget: Arc::clone(&budget),
            capacity,
        },
        ByteReceiver { rx, budget },
    )
}

/// Producer half of a byte queue.
#[derive(Debug, Clone)]
pub struct ByteSender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    budget: Arc<Semaphore>,
    capacity: usize,
}

impl ByteSender {
    /// Pushes a chunk, suspending until the queue has room for all of it.
    ///
    /// Fails only when the chunk can never fit or the consumer is gone;
    /// a full queue blocks instead of failing.
    pub async fn push(&self, chunk: Vec<u8>) -> Result<(), TransferError> {
        if chunk.len() > self.capacity {
            return Err(TransferError::ChunkTooLarge {
                len: chunk.len(),
                capacity: self.capacity,
            });
        }

        let permit = self
            .budget
            .acquire_many(chunk.len() as u32)
            .await
            .map_err(|_| TransferError::QueueClosed)?;
        // The bytes now own their share of the budget; the consumer
        // returns it on pop.
        permit.forget();

        self.tx.send(chunk).map_err(|rejected| {
            self.budget.add_permits(rejected.0.len());
            TransferError::QueueClosed
        })
    }

    /// Byte capacity the queue was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer half of a byte queue.
#[derive(Debug)]
pub struct ByteReceiver {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    budget: Arc<Semaphore>,
}

impl ByteReceiver {
    /// Pops the next chunk, suspending until one is available.
    ///
    /// Returns `None` once the producer is gone and the queue drained.
    pub async fn pop(&mut self) -> Option<Vec<u8>> {
        let chunk = self.rx.recv().await?;
        self.budget.add_permits(chunk.len());
        Some(chunk)
    }
}
