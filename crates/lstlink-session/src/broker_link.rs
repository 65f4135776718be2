use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use lstlink_frame::{FrameError, FrameReader, FrameWriter};
use lstlink_transport::{IpcStream, TransportError, UnixDomainSocket};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::link::Link;
use crate::queue::{InboundQueue, Recv};

/// A link through a running broker.
///
/// Packets go out on the broker's ingress socket. A background thread
/// drains the broadcast socket into a bounded queue, so nothing is missed
/// between two polls.
pub struct BrokerLink {
    writer: FrameWriter<IpcStream>,
    rx: IpcStream,
    queue: Arc<InboundQueue>,
    listener: Option<JoinHandle<()>>,
}

impl BrokerLink {
    /// Connect to the broadcast (`rx`) and ingress (`tx`) sockets.
    pub fn connect(rx: &Path, tx: &Path, queue_capacity: usize) -> Result<Self> {
        let rx_stream = UnixDomainSocket::connect(rx)?;
        let tx_stream = UnixDomainSocket::connect(tx)?;
        let reader_stream = rx_stream.try_clone()?;

        let queue = Arc::new(InboundQueue::new(queue_capacity));
        let worker_queue = Arc::clone(&queue);
        let listener = std::thread::Builder::new()
            .name("broker-listener".to_string())
            .spawn(move || drain_broadcast(FrameReader::new(reader_stream), &worker_queue))
            .map_err(TransportError::Io)?;

        debug!(rx = %rx.display(), tx = %tx.display(), "connected to broker");
        Ok(Self {
            writer: FrameWriter::new(tx_stream),
            rx: rx_stream,
            queue,
            listener: Some(listener),
        })
    }
}

fn drain_broadcast(mut reader: FrameReader<IpcStream>, queue: &InboundQueue) {
    loop {
        match reader.read_frame() {
            Ok(frame) => {
                debug!(packet = %hex::encode(&frame), "received");
                queue.push(frame);
            }
            Err(FrameError::ConnectionClosed) => {
                queue.close("broker closed the broadcast socket");
                return;
            }
            Err(err) => {
                warn!(%err, "broadcast read failed");
                queue.close(err.to_string());
                return;
            }
        }
    }
}

impl Link for BrokerLink {
    fn send_message(&mut self, message: &[u8]) -> Result<()> {
        debug!(packet = %hex::encode(message), "sending");
        self.writer.send(message)?;
        Ok(())
    }

    fn poll_message(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        match self.queue.recv_timeout(timeout) {
            Recv::Message(message) => Ok(Some(message)),
            Recv::Empty => Ok(None),
            Recv::Closed(reason) => Err(SessionError::Disconnected(reason)),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.queue.clear();
        Ok(())
    }
}

impl std::fmt::Debug for BrokerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerLink")
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Drop for BrokerLink {
    fn drop(&mut self) {
        // Wakes the listener's blocking read with EOF.
        let _ = self.rx.shutdown();
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
    }
}
