//! Wire protocol vocabulary for the PhotoVault phone link.
//!
//! The link carries newline-terminated ASCII command tokens, a raw
//! 4-byte length field used by the list-echo handshake, and a JSON
//! metadata document describing a file before (or instead of) its
//! binary payload. This crate defines the vocabulary and codecs only;
//! it performs no I/O.

mod commands;
mod metadata;

pub use commands::{
    ACK, DEL, DEL_ERR, DEL_OK, END, ENDM, LIST_LEN_FIELD_SIZE, RESET, RX_GETFILE, RX_GETFLIST,
    RX_OK, RX_START, RX_STARTM, TX_ERR, TX_OK, decode_list_length, encode_list_length, is_command,
};
pub use metadata::FileMetadata;

/// Maximum accepted length for a device-relative path in metadata.
pub const MAX_PATH_LEN: usize = 256;

/// Errors produced by the protocol crate.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid metadata JSON: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("path too long: {len} bytes (max {MAX_PATH_LEN})")]
    PathTooLong { len: usize },

    #[error("empty path in metadata")]
    EmptyPath,
}
