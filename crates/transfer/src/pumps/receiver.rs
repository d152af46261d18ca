//! Receiver pump — appends inbound payload chunks to storage.

use std::path::PathBuf;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{ByteReceiver, FlushPolicy};

/// Drains the inbound queue and appends each chunk to the active
/// destination file.
///
/// The destination is published by the arbiter through the watch
/// channel once metadata has been parsed; chunks arriving with no
/// destination set are dropped with a warning. Write failures are
/// logged and fail only that chunk; the pump itself runs until the
/// queue closes or cancellation.
pub async fn receiver_pump(
    mut inbound: ByteReceiver,
    dest: watch::Receiver<Option<PathBuf>>,
    policy: FlushPolicy,
    cancel: CancellationToken,
) {
    // Only used by the batched policy: the file currently held open.
    let mut open: Option<(PathBuf, File)> = None;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = inbound.pop() => match chunk {
                Some(c) => c,
                None => break,
            },
        };

        if chunk.is_empty() {
            continue;
        }

        let Some(path) = dest.borrow().clone() else {
            warn!(bytes = chunk.len(), "payload chunk with no destination, dropping");
            continue;
        };

        let result = match policy {
            FlushPolicy::PerChunk => append_once(&path, &chunk).await,
            FlushPolicy::Batched => append_batched(&mut open, path, &chunk).await,
        };
        if let Err(e) = result {
            error!(error = %e, "failed to append payload chunk");
        }
    }

    if let Some((path, file)) = open.take() {
        if let Err(e) = file.sync_all().await {
            error!(path = %path.display(), error = %e, "failed to sync destination on shutdown");
        }
    }
    debug!("receiver pump stopped");
}

/// Open in append mode, write, close. Durability over throughput: a
/// crash loses at most the chunk in flight.
async fn append_once(path: &PathBuf, chunk: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(chunk).await?;
    file.flush().await
}

/// Keep the destination open across chunks; sync and reopen when the
/// destination changes.
async fn append_batched(
    open: &mut Option<(PathBuf, File)>,
    path: PathBuf,
    chunk: &[u8],
) -> std::io::Result<()> {
    let stale = matches!(open, Some((current, _)) if *current != path);
    if stale {
        if let Some((old_path, old_file)) = open.take() {
            if let Err(e) = old_file.sync_all().await {
                error!(path = %old_path.display(), error = %e, "failed to sync previous destination");
            }
        }
    }

    if open.is_none() {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        *open = Some((path, file));
    }

    if let Some((_, file)) = open {
        file.write_all(chunk).await?;
        file.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_queue;

    async fn run_pump_to_completion(
        policy: FlushPolicy,
        dest: watch::Receiver<Option<PathBuf>>,
        chunks: Vec<Vec<u8>>,
    ) {
        let (tx, rx) = byte_queue(1024);
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(receiver_pump(rx, dest, policy, cancel));

        for chunk in chunks {
            tx.push(chunk).await.unwrap();
        }
        drop(tx);
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn per_chunk_policy_appends_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("b.jpg");
        let (_dest_tx, dest_rx) = watch::channel(Some(path.clone()));

        run_pump_to_completion(
            FlushPolicy::PerChunk,
            dest_rx,
            vec![b"abcdef".to_vec(), b"ghij".to_vec()],
        )
        .await;

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghij");
    }

    #[tokio::test]
    async fn batched_policy_produces_identical_output() {
        let tmp = tempfile::tempdir().unwrap();
        let chunks = vec![b"abcdef".to_vec(), b"ghij".to_vec()];

        let per_chunk = tmp.path().join("per_chunk.bin");
        let (_t1, d1) = watch::channel(Some(per_chunk.clone()));
        run_pump_to_completion(FlushPolicy::PerChunk, d1, chunks.clone()).await;

        let batched = tmp.path().join("batched.bin");
        let (_t2, d2) = watch::channel(Some(batched.clone()));
        run_pump_to_completion(FlushPolicy::Batched, d2, chunks).await;

        assert_eq!(
            std::fs::read(&per_chunk).unwrap(),
            std::fs::read(&batched).unwrap()
        );
    }

    #[tokio::test]
    async fn chunk_without_destination_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let (dest_tx, dest_rx) = watch::channel(None);

        let (tx, rx) = byte_queue(1024);
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(receiver_pump(rx, dest_rx, FlushPolicy::PerChunk, cancel));

        tx.push(b"orphan".to_vec()).await.unwrap();

        // Then a destination appears and later chunks land.
        let path = tmp.path().join("late.bin");
        dest_tx.send(Some(path.clone())).unwrap();
        tx.push(b"kept".to_vec()).await.unwrap();

        drop(tx);
        pump.await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn destination_change_switches_files() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first.bin");
        let second = tmp.path().join("second.bin");

        for policy in [FlushPolicy::PerChunk, FlushPolicy::Batched] {
            let _ = std::fs::remove_file(&first);
            let _ = std::fs::remove_file(&second);

            let (dest_tx, dest_rx) = watch::channel(Some(first.clone()));
            let (tx, rx) = byte_queue(1024);
            let cancel = CancellationToken::new();
            let pump = tokio::spawn(receiver_pump(rx, dest_rx, policy, cancel));

            tx.push(b"one".to_vec()).await.unwrap();
            // Let the pump drain before retargeting.
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            dest_tx.send(Some(second.clone())).unwrap();
            tx.push(b"two".to_vec()).await.unwrap();

            drop(tx);
            pump.await.unwrap();

            assert_eq!(std::fs::read(&first).unwrap(), b"one", "{policy:?}");
            assert_eq!(std::fs::read(&second).unwrap(), b"two", "{policy:?}");
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_pump() {
        let (_tx, rx) = byte_queue(16);
        let (_dest_tx, dest_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let pump = tokio::spawn(receiver_pump(
            rx,
            dest_rx,
            FlushPolicy::PerChunk,
            cancel.clone(),
        ));
        cancel.cancel();
        pump.await.unwrap();
    }
}
