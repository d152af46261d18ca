//! Command tokens and the raw list-length field.
//!
//! Tokens are fixed ASCII strings, newline-terminated unless noted.
//! There is no length-prefixed framing for commands: a chunk is a
//! command only if its length equals the token length exactly and
//! every byte matches.

/// Start receiving a raw file from the client (reserved, pre-metadata protocol).
pub const RX_START: &[u8] = b"RXSTART\n";

/// Start a metadata exchange; also echoed by the device as "ready for metadata".
pub const RX_STARTM: &[u8] = b"RXSTARTM\n";

/// Client requests the backup log file list.
pub const RX_GETFLIST: &[u8] = b"RXGETFLIST\n";

/// Client requests a file download.
pub const RX_GETFILE: &[u8] = b"RXGETFILE\n";

/// Device confirms a complete file reception.
pub const RX_OK: &[u8] = b"RXOK\n";

/// Client confirms a complete file transmission from the device.
pub const TX_OK: &[u8] = b"TXOK\n";

/// Client reports a failed transmission from the device.
pub const TX_ERR: &[u8] = b"TXERRR\n";

/// Client requests deletion of a previously backed-up file.
pub const DEL: &[u8] = b"DEL\n";

/// Device confirms a deletion.
pub const DEL_OK: &[u8] = b"DELOK\n";

/// Device reports a failed deletion.
pub const DEL_ERR: &[u8] = b"DELERR\n";

/// End of the metadata phase.
pub const ENDM: &[u8] = b"ENDM\n";

/// End of a transaction.
pub const END: &[u8] = b"END\n";

/// Bare acknowledgement (no newline).
pub const ACK: &[u8] = b"ACK";

/// External reset request; mapped by the host layer onto an arbiter reset,
/// never consumed by the state machine itself.
pub const RESET: &[u8] = b"RESET\n";

/// Size in bytes of the raw length field sent before streaming the log.
pub const LIST_LEN_FIELD_SIZE: usize = 4;

/// Returns `true` when `chunk` is exactly `token`.
///
/// Matching is length-first, then byte-exact: a chunk that is a prefix
/// or superset of a token never matches.
pub fn is_command(chunk: &[u8], token: &[u8]) -> bool {
    chunk.len() == token.len() && chunk == token
}

/// Encodes the list-length field as sent on the wire (little-endian).
pub fn encode_list_length(len: u32) -> [u8; LIST_LEN_FIELD_SIZE] {
    len.to_le_bytes()
}

/// Decodes a list-length echo. Returns `None` unless the chunk is
/// exactly [`LIST_LEN_FIELD_SIZE`] bytes.
pub fn decode_list_length(chunk: &[u8]) -> Option<u32> {
    let bytes: [u8; LIST_LEN_FIELD_SIZE] = chunk.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
