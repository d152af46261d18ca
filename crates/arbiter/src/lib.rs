//! Protocol state machine ("arbiter") for the PhotoVault phone link.
//!
//! The arbiter is the protocol brain: it interprets every inbound byte
//! chunk as either a command token or payload, drives the transfer
//! state, and produces all outputs as side effects — pushes onto the
//! byte queues, backup log updates, file deletions. It runs inside the
//! transport's receive callback: exactly one [`Arbiter::feed`] call per
//! received chunk, never reentered, and its only suspension points are
//! bounded-queue pushes and the synchronous file-send helper.
//!
//! Faults are terminal with respect to inbound bytes. Recovery is an
//! explicit host decision via [`Arbiter::reset`], never inferred from
//! the byte stream.

mod machine;

pub use machine::{Arbiter, ArbiterConfig};

/// Protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    /// Idle, between transactions.
    Wait,
    /// A metadata exchange is in progress.
    MetaExchange,
    /// Binary payload for an upload is being received.
    PayloadRx,
    /// A receive-side failure occurred; inbound bytes are ignored.
    RxFault,
    /// The log length was announced; awaiting the client's echo.
    ListEchoWait,
    /// A file was streamed out; awaiting the client's acknowledgement.
    TxAckWait,
    /// A transmit-side failure occurred; inbound bytes are ignored.
    TxFault,
}

/// What the in-flight metadata exchange is for.
///
/// Upload and download share the same metadata sub-states; deletion
/// reuses them to name its victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Action {
    #[default]
    None,
    /// Client is sending a file to the device.
    Upload,
    /// Client is requesting a file from the device.
    Download,
    /// Client is requesting deletion of a backed-up file.
    Delete,
}
