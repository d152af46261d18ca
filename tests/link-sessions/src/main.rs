fn main() {
    println!("Run `cargo test -p link-sessions` to execute full-link session tests.");
}

/// End-to-end sessions over a fully wired pipeline: arbiter, byte
/// queues, receiver and transmitter pumps, and a transport double in
/// place of the Bluetooth serial link.
#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;

    use photovault_arbiter::{Arbiter, ArbiterConfig, ArbiterState};
    use photovault_backup_log::BackupLog;
    use photovault_transfer::{FlushPolicy, Transport, TransferError, byte_queue, pumps};

    const SERIAL: &str = "PV-SESSION";

    /// Collects everything the device "sends to the phone".
    struct CollectingTransport {
        written: Mutex<Vec<u8>>,
    }

    impl CollectingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                written: Mutex::new(Vec::new()),
            })
        }

        fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }
    }

    impl Transport for CollectingTransport {
        async fn send(&self, bytes: &[u8]) -> Result<(), TransferError> {
            self.written.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
    }

    struct Session {
        _tmp: tempfile::TempDir,
        mount: PathBuf,
        arbiter: Arbiter,
        transport: Arc<CollectingTransport>,
        log: BackupLog,
        cancel: CancellationToken,
    }

    fn session(policy: FlushPolicy) -> Session {
        let tmp = tempfile::tempdir().unwrap();
        let mount = tmp.path().to_path_buf();
        let log = BackupLog::new(&mount);

        let (in_tx, in_rx) = byte_queue(4096);
        let (out_tx, out_rx) = byte_queue(4096);
        let (dest_tx, dest_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let transport = CollectingTransport::new();

        tokio::spawn(pumps::receiver_pump(in_rx, dest_rx, policy, cancel.clone()));
        tokio::spawn(pumps::transmitter_pump(
            out_rx,
            Arc::clone(&transport),
            cancel.clone(),
        ));

        let arbiter = Arbiter::new(
            ArbiterConfig {
                mount_point: mount.clone(),
                serial_number: SERIAL.into(),
                chunk_size: 4,
            },
            log.clone(),
            in_tx,
            out_tx,
            dest_tx,
        );

        Session {
            _tmp: tmp,
            mount,
            arbiter,
            transport,
            log,
            cancel,
        }
    }

    /// Polls until `pred` holds or a generous deadline passes.
    async fn wait_until(mut pred: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !pred() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn run_upload(s: &mut Session, chunks: &[&[u8]]) {
        s.arbiter.feed(b"RXSTARTM\n").await;
        s.arbiter
            .feed(br#"{"filepath":"/a/b.jpg","filesize":10}"#)
            .await;
        s.arbiter.feed(b"ENDM\n").await;
        for chunk in chunks {
            s.arbiter.feed(chunk).await;
        }
    }

    #[tokio::test]
    async fn upload_session_writes_exactly_the_announced_bytes() {
        let mut s = session(FlushPolicy::PerChunk);

        run_upload(&mut s, &[b"abcdef", b"ghij"]).await;
        assert_eq!(s.arbiter.state(), ArbiterState::Wait);

        let dest = s.mount.join("a/b.jpg");
        wait_until(|| std::fs::read(&dest).is_ok_and(|d| d.len() == 10)).await;
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcdefghij");

        // One RXSTARTM echo, one ENDM echo, one RXOK — nothing else.
        wait_until(|| s.transport.written().len() == 19).await;
        assert_eq!(s.transport.written(), b"RXSTARTM\nENDM\nRXOK\n");

        assert!(s.log.is_logged(SERIAL, "/a/b.jpg"));
        s.cancel.cancel();
    }

    #[tokio::test]
    async fn flush_policies_produce_identical_files() {
        let mut per_chunk = session(FlushPolicy::PerChunk);
        run_upload(&mut per_chunk, &[b"abc", b"def", b"ghij"]).await;
        let a = per_chunk.mount.join("a/b.jpg");
        wait_until(|| std::fs::read(&a).is_ok_and(|d| d.len() == 10)).await;

        let mut batched = session(FlushPolicy::Batched);
        run_upload(&mut batched, &[b"abc", b"def", b"ghij"]).await;
        let b = batched.mount.join("a/b.jpg");
        wait_until(|| std::fs::read(&b).is_ok_and(|d| d.len() == 10)).await;

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
        per_chunk.cancel.cancel();
        batched.cancel.cancel();
    }

    #[tokio::test]
    async fn list_fetch_session_streams_the_log() {
        let mut s = session(FlushPolicy::PerChunk);
        s.log.append(SERIAL, "/a/b.jpg").unwrap();
        s.log.append(SERIAL, "/c/d.jpg").unwrap();
        let log_len = s.log.file_length(SERIAL).unwrap() as usize;

        s.arbiter.feed(b"RXGETFLIST\n").await;
        wait_until(|| s.transport.written().len() >= 4).await;
        let announced = s.transport.written();
        assert_eq!(announced.len(), 4, "only the length field so far");
        assert_eq!(
            u32::from_le_bytes(announced.clone().try_into().unwrap()) as usize,
            log_len
        );

        // Echo the same four bytes back; the log streams out.
        s.arbiter.feed(&announced).await;
        assert_eq!(s.arbiter.state(), ArbiterState::TxAckWait);
        wait_until(|| s.transport.written().len() == 4 + log_len).await;
        assert_eq!(
            &s.transport.written()[4..],
            b"\"/a/b.jpg\"\n\"/c/d.jpg\"\n"
        );

        s.arbiter.feed(b"TXOK\n").await;
        assert_eq!(s.arbiter.state(), ArbiterState::Wait);
        s.cancel.cancel();
    }

    #[tokio::test]
    async fn list_echo_mismatch_streams_nothing() {
        let mut s = session(FlushPolicy::PerChunk);
        s.log.append(SERIAL, "/a").unwrap();

        s.arbiter.feed(b"RXGETFLIST\n").await;
        wait_until(|| s.transport.written().len() == 4).await;

        s.arbiter.feed(&999u32.to_le_bytes()).await;
        assert_eq!(s.arbiter.state(), ArbiterState::ListEchoWait);

        // Give the pipeline a moment; nothing beyond the length field
        // may appear.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(s.transport.written().len(), 4);
        s.cancel.cancel();
    }

    #[tokio::test]
    async fn download_session_streams_the_file() {
        let mut s = session(FlushPolicy::PerChunk);
        std::fs::create_dir_all(s.mount.join("a")).unwrap();
        std::fs::write(s.mount.join("a/b.jpg"), b"0123456789").unwrap();

        s.arbiter.feed(b"RXGETFILE\n").await;
        s.arbiter
            .feed(br#"{"filepath":"/a/b.jpg","filesize":10}"#)
            .await;
        assert_eq!(s.arbiter.state(), ArbiterState::TxAckWait);

        wait_until(|| s.transport.written().len() == 9 + 10).await;
        assert_eq!(s.transport.written(), b"RXSTARTM\n0123456789");

        s.arbiter.feed(b"TXOK\n").await;
        assert_eq!(s.arbiter.state(), ArbiterState::Wait);
        s.cancel.cancel();
    }
}
