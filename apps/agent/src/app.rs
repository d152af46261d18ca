//! Application orchestrator — wires the queues, pumps and arbiter
//! around the serial device and runs until shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use photovault_arbiter::{Arbiter, ArbiterConfig};
use photovault_backup_log::BackupLog;
use photovault_protocol::{RESET, is_command};
use photovault_transfer::{Transport, TransferError, byte_queue, pumps};

use crate::config::Config;

/// Read size for the serial device.
const READ_BUF_SIZE: usize = 1024;

/// Byte sink over the serial device the Bluetooth stack exposes.
///
/// The stack either takes the whole write or errors; retry policy
/// lives above this layer (there is none by design).
struct SerialTransport {
    writer: Mutex<tokio::fs::File>,
}

impl Transport for SerialTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransferError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Runs the agent until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let log = BackupLog::new(&config.mount_point);

    // -- Queues and pipeline --
    let (in_tx, in_rx) = byte_queue(config.inbound_capacity);
    let (out_tx, out_rx) = byte_queue(config.outbound_capacity);
    let (dest_tx, dest_rx) = watch::channel(None);

    // The Bluetooth stack (paired and brought up externally) exposes
    // the phone link as a serial device; opening it is all the
    // transport bring-up this agent does.
    let device = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&config.device)
        .await
        .with_context(|| format!("failed to open serial device {}", config.device))?;
    let writer = device.try_clone().await?;
    let transport = Arc::new(SerialTransport {
        writer: Mutex::new(writer),
    });

    let receiver = tokio::spawn(pumps::receiver_pump(
        in_rx,
        dest_rx,
        config.flush_policy,
        cancel.clone(),
    ));
    let transmitter = tokio::spawn(pumps::transmitter_pump(
        out_rx,
        Arc::clone(&transport),
        cancel.clone(),
    ));

    // -- Queued sends --
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (status_tx, mut status_rx) = mpsc::channel(16);
    let command = tokio::spawn(pumps::command_pump(
        cmd_rx,
        out_tx.clone(),
        status_tx,
        config.chunk_size,
        cancel.clone(),
    ));

    tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            match &status.result {
                Ok(bytes) => {
                    info!(path = %status.file_path.display(), bytes, "queued transfer complete");
                }
                Err(e) => {
                    error!(path = %status.file_path.display(), error = %e, "queued transfer failed");
                }
            }
        }
    });

    // SIGUSR1 queues a dump of the backup log to the client — the one
    // producer wired to the command queue today; a backup manager
    // takes this over when retry scheduling lands.
    #[cfg(unix)]
    tokio::spawn(log_dump_on_signal(
        cmd_tx,
        log.log_path(&config.serial_number),
        cancel.clone(),
    ));
    #[cfg(not(unix))]
    drop(cmd_tx);

    // -- Arbiter, fed from the serial device --
    let mut arbiter = Arbiter::new(
        ArbiterConfig {
            mount_point: config.mount_point.clone().into(),
            serial_number: config.serial_number.clone(),
            chunk_size: config.chunk_size,
        },
        log,
        in_tx,
        out_tx,
        dest_tx,
    );

    let feed_cancel = cancel.clone();
    let feeder = tokio::spawn(async move {
        let mut reader = device;
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let read = tokio::select! {
                _ = feed_cancel.cancelled() => break,
                read = reader.read(&mut buf) => read,
            };
            match read {
                Ok(0) => {
                    warn!("serial device closed");
                    break;
                }
                Ok(n) => {
                    let chunk = &buf[..n];
                    // RESET is host-layer: it recovers the arbiter from
                    // any state, fault states included, and never flows
                    // through the state machine itself.
                    if is_command(chunk, RESET) {
                        arbiter.reset();
                    } else {
                        arbiter.feed(chunk).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "serial read failed");
                    break;
                }
            }
        }
    });

    info!("agent ready");

    // -- Main loop: wait for shutdown --
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
        }
        _ = cancel.cancelled() => {
            info!("shutdown signal received");
        }
    }

    // -- Graceful shutdown --
    cancel.cancel();
    let _ = tokio::join!(feeder, receiver, transmitter, command);

    Ok(())
}

/// Waits for SIGUSR1 and queues the backup log for sending.
#[cfg(unix)]
async fn log_dump_on_signal(
    cmd_tx: mpsc::Sender<photovault_transfer::TransferCommand>,
    log_path: std::path::PathBuf,
    cancel: CancellationToken,
) {
    use photovault_transfer::{TransferCommand, TransferDirection};
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGUSR1 handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            sig = usr1.recv() => {
                if sig.is_none() {
                    break;
                }
                info!("SIGUSR1 received, queueing backup log dump");
                let cmd = TransferCommand {
                    file_path: log_path.clone(),
                    direction: TransferDirection::Tx,
                };
                if cmd_tx.send(cmd).await.is_err() {
                    break;
                }
            }
        }
    }
}
