use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lstlink_frame::{FrameConfig, FrameWriter};
use lstlink_transport::{IpcStream, UnixDomainSocket};
use tracing::{debug, info, warn};

use crate::error::Result;

/// One-to-many publishing endpoint.
///
/// Subscribers connect to the socket and only ever read. Publishing writes
/// the framed packet to each of them in turn; any subscriber whose write
/// fails or times out is dropped.
pub struct Fanout {
    name: &'static str,
    socket: UnixDomainSocket,
    subscribers: Mutex<Vec<FrameWriter<IpcStream>>>,
    write_timeout: Duration,
}

impl Fanout {
    pub fn new(name: &'static str, socket: UnixDomainSocket, write_timeout: Duration) -> Self {
        Self {
            name,
            socket,
            subscribers: Mutex::new(Vec::new()),
            write_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FrameWriter<IpcStream>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take every connection waiting on the socket.
    ///
    /// The socket must be non-blocking.
    pub fn accept_pending(&self) -> Result<usize> {
        let mut accepted = 0;
        while let Some(stream) = self.socket.try_accept()? {
            let config = FrameConfig {
                write_timeout: Some(self.write_timeout),
                ..FrameConfig::default()
            };
            let writer = FrameWriter::with_config_ipc(stream, config)?;
            self.lock().push(writer);
            accepted += 1;
        }
        if accepted > 0 {
            info!(endpoint = self.name, accepted, total = self.len(), "subscribers attached");
        }
        Ok(accepted)
    }

    /// Send `packet` to every subscriber. Returns how many received it.
    pub fn publish(&self, packet: &[u8]) -> usize {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain_mut(|subscriber| match subscriber.send(packet) {
            Ok(()) => true,
            Err(err) => {
                warn!(endpoint = self.name, %err, "dropping subscriber");
                false
            }
        });
        if before > 0 {
            debug!(
                endpoint = self.name,
                delivered = subscribers.len(),
                packet = %hex::encode(packet),
                "published"
            );
        }
        subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("name", &self.name)
            .field("path", &self.socket.path())
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use lstlink_frame::FrameReader;

    use super::*;

    fn socket_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "lstlink-fanout-{tag}-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    fn fanout(path: &Path) -> Fanout {
        let socket = UnixDomainSocket::bind(path).unwrap();
        socket.set_nonblocking(true).unwrap();
        Fanout::new("test", socket, Duration::from_millis(100))
    }

    #[test]
    fn publishes_to_every_subscriber() {
        let path = socket_path("all");
        let fanout = fanout(&path);
        let first = UnixDomainSocket::connect(&path).unwrap();
        let second = UnixDomainSocket::connect(&path).unwrap();
        assert_eq!(fanout.accept_pending().unwrap(), 2);

        assert_eq!(fanout.publish(b"beacon"), 2);
        for stream in [first, second] {
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let mut reader = FrameReader::new(stream);
            assert_eq!(reader.read_frame().unwrap().as_ref(), b"beacon");
        }
    }

    #[test]
    fn drops_closed_subscriber() {
        let path = socket_path("closed");
        let fanout = fanout(&path);
        let alive = UnixDomainSocket::connect(&path).unwrap();
        let gone = UnixDomainSocket::connect(&path).unwrap();
        assert_eq!(fanout.accept_pending().unwrap(), 2);
        drop(gone);

        assert_eq!(fanout.publish(b"still here"), 1);
        assert_eq!(fanout.len(), 1);

        alive
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut reader = FrameReader::new(alive);
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"still here");
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let path = socket_path("empty");
        let fanout = fanout(&path);
        assert_eq!(fanout.accept_pending().unwrap(), 0);
        assert_eq!(fanout.publish(b"nobody"), 0);
        assert!(fanout.is_empty());
    }
}
