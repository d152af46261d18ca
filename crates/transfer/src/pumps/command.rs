//! Command pump — processes queued sends of named files.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ByteSender, TransferCommand, TransferDirection, TransferError, TransferStatus, send_file};

/// Drains the command queue, streams each named file to the outbound
/// queue, and reports an outcome on the status channel.
///
/// Only `Tx` commands are meaningful here; reception is driven by the
/// arbiter and the receiver pump, so an `Rx` command is rejected with
/// a failure status.
pub async fn command_pump(
    mut commands: mpsc::Receiver<TransferCommand>,
    outbound: ByteSender,
    status: mpsc::Sender<TransferStatus>,
    chunk_size: usize,
    cancel: CancellationToken,
) {
    loop {
        let cmd = tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = commands.recv() => match cmd {
                Some(c) => c,
                None => break,
            },
        };

        let result = match cmd.direction {
            TransferDirection::Tx => {
                info!(path = %cmd.file_path.display(), "processing queued send");
                send_file(&cmd.file_path, &outbound, chunk_size).await
            }
            TransferDirection::Rx => {
                warn!(path = %cmd.file_path.display(), "receive command on the send queue, rejecting");
                Err(TransferError::Transport(
                    "receive commands are not queueable".into(),
                ))
            }
        };

        let report = TransferStatus {
            file_path: cmd.file_path,
            direction: cmd.direction,
            result,
        };
        if status.send(report).await.is_err() {
            // Nobody is listening for outcomes anymore; keep draining
            // commands so producers are not wedged.
            warn!("status channel closed");
        }
    }
    debug!("command pump stopped");
}
