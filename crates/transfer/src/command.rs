//! Queued transfer commands and their status reports.
//!
//! The command queue is the decoupled path for outbound sends of named
//! files (the backup log, retries queued by a future backup manager).
//! Direct payload streaming bypasses it and goes straight through the
//! byte queues.

use std::path::PathBuf;

use crate::TransferError;

/// Which way a queued transfer moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Device → client.
    Tx,
    /// Client → device.
    Rx,
}

/// A request to move one named file.
#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub file_path: PathBuf,
    pub direction: TransferDirection,
}

/// Outcome report for a processed [`TransferCommand`].
#[derive(Debug)]
pub struct TransferStatus {
    pub file_path: PathBuf,
    pub direction: TransferDirection,
    /// Bytes moved on success.
    pub result: Result<u64, TransferError>,
}

impl TransferStatus {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
