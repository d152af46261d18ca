//! Transmitter pump — hands outbound chunks to the transport.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{ByteReceiver, Transport};

/// Drains the outbound queue and writes each chunk to the transport.
///
/// The transport either fully accepts a chunk or fails it; a failed
/// chunk is logged and abandoned, and the pump moves on to the next.
pub async fn transmitter_pump<T: Transport>(
    mut outbound: ByteReceiver,
    transport: Arc<T>,
    cancel: CancellationToken,
) {
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = outbound.pop() => match chunk {
                Some(c) => c,
                None => break,
            },
        };

        if let Err(e) = transport.send(&chunk).await {
            error!(bytes = chunk.len(), error = %e, "transport send failed, chunk abandoned");
        }
    }
    debug!("transmitter pump stopped");
}
