//! File metadata document exchanged before a payload.

use serde::{Deserialize, Serialize};

use crate::{MAX_PATH_LEN, ProtocolError};

/// Metadata describing the file a transfer is about.
///
/// Sent by the client as a bare JSON document (not newline-wrapped),
/// e.g. `{"filepath":"/a/b.jpg","filesize":10}`. The path is as named
/// on the remote device; resolving it against the local mount point is
/// the arbiter's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filepath: String,
    pub filesize: u64,
}

impl FileMetadata {
    /// Parses a metadata chunk.
    ///
    /// The whole chunk must be the JSON document; trailing bytes are a
    /// parse error, not payload.
    pub fn parse(chunk: &[u8]) -> Result<Self, ProtocolError> {
        let meta: FileMetadata = serde_json::from_slice(chunk)?;
        if meta.filepath.is_empty() {
            return Err(ProtocolError::EmptyPath);
        }
        if meta.filepath.len() > MAX_PATH_LEN {
            return Err(ProtocolError::PathTooLong {
                len: meta.filepath.len(),
            });
        }
        Ok(meta)
    }
}
