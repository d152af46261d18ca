//! The arbiter itself: context, transitions, side effects.

use std::path::PathBuf;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use photovault_backup_log::BackupLog;
use photovault_protocol::{
    self as protocol, DEL, DEL_ERR, DEL_OK, ENDM, FileMetadata, RX_GETFILE, RX_GETFLIST, RX_OK,
    RX_STARTM, TX_OK,
};
use photovault_transfer::{ByteSender, send_file};

use crate::{Action, ArbiterState};

/// Static parameters for one connection.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Storage mount point that device-relative paths resolve against.
    pub mount_point: PathBuf,
    /// Serial number used when the client has not otherwise identified
    /// itself; keys the backup log.
    pub serial_number: String,
    /// Read size for outbound file streaming.
    pub chunk_size: usize,
}

/// Mutable protocol context, owned exclusively by the arbiter.
///
/// Lives for one connection; nothing else may mutate it.
#[derive(Debug)]
struct ArbiterContext {
    state: ArbiterState,
    action: Action,
    /// Bytes expected for the in-flight payload.
    expected_size: u64,
    /// Payload bytes moved so far; never exceeds `expected_size`.
    bytes_transferred: u64,
    /// Path as named by the remote client.
    device_relative_path: String,
    /// Resolved on-device path, trusted only after a parsed metadata
    /// message.
    absolute_path: Option<PathBuf>,
    /// Log length most recently announced to the client.
    pending_list_length: u32,
}

impl Default for ArbiterContext {
    fn default() -> Self {
        Self {
            state: ArbiterState::Wait,
            action: Action::None,
            expected_size: 0,
            bytes_transferred: 0,
            device_relative_path: String::new(),
            absolute_path: None,
            pending_list_length: 0,
        }
    }
}

/// The protocol state machine. One instance serves one connection.
pub struct Arbiter {
    ctx: ArbiterContext,
    config: ArbiterConfig,
    log: BackupLog,
    inbound: ByteSender,
    outbound: ByteSender,
    dest: watch::Sender<Option<PathBuf>>,
}

impl Arbiter {
    /// Creates an arbiter wired to the pipeline queues.
    ///
    /// `dest` publishes the active upload destination to the receiver
    /// pump; the arbiter is its only writer.
    pub fn new(
        config: ArbiterConfig,
        log: BackupLog,
        inbound: ByteSender,
        outbound: ByteSender,
        dest: watch::Sender<Option<PathBuf>>,
    ) -> Self {
        Self {
            ctx: ArbiterContext::default(),
            config,
            log,
            inbound,
            outbound,
            dest,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> ArbiterState {
        self.ctx.state
    }

    /// Feeds one received chunk into the state machine.
    ///
    /// Called exactly once per chunk from the transport's receive
    /// callback; never reentered. All outputs are side effects.
    pub async fn feed(&mut self, data: &[u8]) {
        match self.ctx.state {
            ArbiterState::Wait => self.on_wait(data).await,
            ArbiterState::MetaExchange => self.on_meta_exchange(data).await,
            ArbiterState::PayloadRx => self.on_payload(data).await,
            ArbiterState::ListEchoWait => self.on_list_echo(data).await,
            ArbiterState::TxAckWait => self.on_tx_ack(data),
            ArbiterState::RxFault => {
                debug!(len = data.len(), "in receive fault state, ignoring data");
            }
            ArbiterState::TxFault => {
                debug!(len = data.len(), "in transmit fault state, ignoring data");
            }
        }
    }

    /// Externally-driven recovery: returns any state, fault states
    /// included, to `Wait` and clears the transfer context.
    pub fn reset(&mut self) {
        info!(state = ?self.ctx.state, "arbiter reset");
        self.ctx = ArbiterContext::default();
        let _ = self.dest.send(None);
    }

    fn set_state(&mut self, next: ArbiterState) {
        let current = self.ctx.state;
        if current != next {
            debug!(from = ?current, to = ?next, "state transition");
        }
        self.ctx.state = next;
    }

    fn resolve(&self, device_relative: &str) -> PathBuf {
        self.config
            .mount_point
            .join(device_relative.trim_start_matches('/'))
    }

    async fn on_wait(&mut self, data: &[u8]) {
        self.ctx.action = Action::None;

        if protocol::is_command(data, RX_STARTM) {
            self.ctx.action = Action::Upload;
            self.set_state(ArbiterState::MetaExchange);
            if let Err(e) = self.outbound.push(RX_STARTM.to_vec()).await {
                error!(error = %e, "failed to echo RXSTARTM");
            }
        } else if protocol::is_command(data, RX_GETFILE) {
            self.ctx.action = Action::Download;
            self.ctx.bytes_transferred = 0;
            if let Err(e) = self.outbound.push(RX_STARTM.to_vec()).await {
                error!(error = %e, "failed to echo RXSTARTM for download");
                self.set_state(ArbiterState::RxFault);
                return;
            }
            self.set_state(ArbiterState::MetaExchange);
        } else if protocol::is_command(data, RX_GETFLIST) {
            let length = match self.log.file_length(&self.config.serial_number) {
                Ok(len) => len as u32,
                Err(e) => {
                    warn!(error = %e, "no backup log yet, announcing empty list");
                    0
                }
            };
            let field = protocol::encode_list_length(length);
            if let Err(e) = self.outbound.push(field.to_vec()).await {
                error!(error = %e, "failed to announce log length");
                return;
            }
            self.ctx.pending_list_length = length;
            info!(length, "announced backup log length to client");
            self.set_state(ArbiterState::ListEchoWait);
        } else if protocol::is_command(data, DEL) {
            self.ctx.action = Action::Delete;
            if let Err(e) = self.outbound.push(RX_STARTM.to_vec()).await {
                error!(error = %e, "failed to acknowledge delete request");
                self.ctx.action = Action::None;
                return;
            }
            self.set_state(ArbiterState::MetaExchange);
        } else {
            warn!(len = data.len(), "unexpected data in wait state, ignoring");
        }
    }

    async fn on_meta_exchange(&mut self, data: &[u8]) {
        match self.ctx.action {
            Action::Upload => self.on_upload_meta(data).await,
            Action::Download => self.on_download_meta(data).await,
            Action::Delete => self.on_delete_meta(data).await,
            Action::None => {
                warn!("metadata chunk with no transaction in flight, ignoring");
            }
        }
    }

    async fn on_upload_meta(&mut self, data: &[u8]) {
        if protocol::is_command(data, ENDM) {
            self.ctx.bytes_transferred = 0;
            self.set_state(ArbiterState::PayloadRx);
            if let Err(e) = self.outbound.push(ENDM.to_vec()).await {
                error!(error = %e, "failed to echo ENDM");
                self.set_state(ArbiterState::RxFault);
            }
            return;
        }

        let meta = match FileMetadata::parse(data) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "unparseable upload metadata, ignoring chunk");
                return;
            }
        };

        let absolute = self.resolve(&meta.filepath);
        if let Some(parent) = absolute.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!(path = %parent.display(), error = %e, "failed to create destination directories");
                self.set_state(ArbiterState::RxFault);
                return;
            }
        }

        info!(path = %absolute.display(), size = meta.filesize, "upload metadata received");
        self.ctx.expected_size = meta.filesize;
        self.ctx.device_relative_path = meta.filepath;
        self.ctx.absolute_path = Some(absolute.clone());
        if self.dest.send(Some(absolute)).is_err() {
            warn!("receiver pump gone, destination not published");
        }
    }

    async fn on_download_meta(&mut self, data: &[u8]) {
        // Any failure here aborts the download and returns to Wait.
        let meta = match FileMetadata::parse(data) {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "unparseable download metadata, aborting");
                self.abort_to_wait();
                return;
            }
        };

        let absolute = self.resolve(&meta.filepath);
        self.ctx.expected_size = meta.filesize;
        self.ctx.device_relative_path = meta.filepath;
        self.ctx.absolute_path = Some(absolute.clone());

        match send_file(&absolute, &self.outbound, self.config.chunk_size).await {
            Ok(sent) if sent == self.ctx.expected_size => {
                info!(path = %absolute.display(), bytes = sent, "file streamed to client");
                self.set_state(ArbiterState::TxAckWait);
            }
            Ok(sent) => {
                error!(
                    sent,
                    requested = self.ctx.expected_size,
                    "sent length does not match requested size"
                );
                self.abort_to_wait();
            }
            Err(e) => {
                error!(path = %absolute.display(), error = %e, "failed to send file");
                self.abort_to_wait();
            }
        }
    }

    async fn on_delete_meta(&mut self, data: &[u8]) {
        let meta = match FileMetadata::parse(data) {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "unparseable delete metadata");
                self.push_delete_reply(false).await;
                self.abort_to_wait();
                return;
            }
        };

        let absolute = self.resolve(&meta.filepath);
        let removed = match tokio::fs::remove_file(&absolute).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %absolute.display(), error = %e, "failed to delete file");
                false
            }
        };

        // The log entry goes best-effort; a missing entry is not a
        // deletion failure.
        match self.log.delete_entry(&self.config.serial_number, &meta.filepath) {
            Ok(true) => debug!(path = %meta.filepath, "backup log entry removed"),
            Ok(false) => debug!(path = %meta.filepath, "no backup log entry for deleted file"),
            Err(e) => warn!(error = %e, "failed to update backup log"),
        }

        if removed {
            info!(path = %absolute.display(), "file deleted on client request");
        }
        self.push_delete_reply(removed).await;
        self.abort_to_wait();
    }

    async fn push_delete_reply(&mut self, ok: bool) {
        let token = if ok { DEL_OK } else { DEL_ERR };
        if let Err(e) = self.outbound.push(token.to_vec()).await {
            error!(error = %e, "failed to send delete reply");
        }
    }

    async fn on_payload(&mut self, data: &[u8]) {
        let remaining = self.ctx.expected_size - self.ctx.bytes_transferred;

        if (data.len() as u64) < remaining {
            if let Err(e) = self.inbound.push(data.to_vec()).await {
                error!(error = %e, "failed to queue payload chunk");
                self.set_state(ArbiterState::RxFault);
                return;
            }
            self.ctx.bytes_transferred += data.len() as u64;
            return;
        }

        // This chunk completes the payload. Bytes beyond the announced
        // size are dropped without validation.
        let in_bound = remaining as usize;
        let excess = data.len() - in_bound;
        if in_bound > 0 {
            if let Err(e) = self.inbound.push(data[..in_bound].to_vec()).await {
                error!(error = %e, "failed to queue final payload chunk");
                self.set_state(ArbiterState::RxFault);
                return;
            }
        }
        self.ctx.bytes_transferred = self.ctx.expected_size;
        if excess > 0 {
            warn!(excess, "excess bytes beyond announced size dropped");
        }

        if let Err(e) = self
            .log
            .append(&self.config.serial_number, &self.ctx.device_relative_path)
        {
            error!(error = %e, "failed to record received file in backup log");
            self.set_state(ArbiterState::RxFault);
            return;
        }

        if let Err(e) = self.outbound.push(RX_OK.to_vec()).await {
            error!(error = %e, "failed to confirm reception");
            self.set_state(ArbiterState::RxFault);
            return;
        }

        info!(
            path = %self.ctx.device_relative_path,
            dest = ?self.ctx.absolute_path,
            bytes = self.ctx.bytes_transferred,
            "file received and logged"
        );
        self.set_state(ArbiterState::Wait);
    }

    async fn on_list_echo(&mut self, data: &[u8]) {
        match protocol::decode_list_length(data) {
            Some(echoed) if echoed == self.ctx.pending_list_length => {
                let log_path = self.log.log_path(&self.config.serial_number);
                match send_file(&log_path, &self.outbound, self.config.chunk_size).await {
                    Ok(sent) => {
                        info!(bytes = sent, "backup log streamed to client");
                        self.set_state(ArbiterState::TxAckWait);
                    }
                    Err(e) => {
                        error!(error = %e, "failed to send backup log");
                        self.abort_to_wait();
                    }
                }
            }
            Some(echoed) => {
                // Held here on purpose: the client may retry with a
                // corrected echo.
                warn!(
                    echoed,
                    expected = self.ctx.pending_list_length,
                    "list length echo mismatch"
                );
            }
            None => {
                warn!(len = data.len(), "unexpected length for list echo");
            }
        }
    }

    fn on_tx_ack(&mut self, data: &[u8]) {
        if protocol::is_command(data, TX_OK) {
            info!("transfer acknowledged by client");
            self.abort_to_wait();
        } else {
            error!(len = data.len(), "expected TXOK acknowledgement");
            self.set_state(ArbiterState::TxFault);
        }
    }

    fn abort_to_wait(&mut self) {
        self.ctx.action = Action::None;
        self.set_state(ArbiterState::Wait);
    }
}
