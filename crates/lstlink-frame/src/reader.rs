use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use lstlink_transport::IpcStream;

use crate::codec::{FrameConfig, FrameDecoder};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 512;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads and line noise internally; callers only ever see
/// whole payloads.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. Read
    /// timeouts surface as `FrameError::Io`.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(payload) = self.decoder.decode(&mut self.buf) {
                return Ok(payload);
            }
            self.fill()?;
        }
    }

    /// Return a buffered frame, or perform at most one read and try again.
    ///
    /// `Ok(None)` means the stream had nothing more to give before its read
    /// timeout. Meant for serial devices and sockets with a read timeout,
    /// where reader threads must keep checking a stop flag.
    pub fn poll_frame(&mut self) -> Result<Option<Bytes>> {
        if let Some(payload) = self.decoder.decode(&mut self.buf) {
            return Ok(Some(payload));
        }
        match self.fill() {
            Ok(()) => Ok(self.decoder.decode(&mut self.buf)),
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes the decoder has thrown away while resynchronising.
    pub fn discarded(&self) -> u64 {
        self.decoder.discarded()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<IpcStream> {
    /// Create a frame reader for `IpcStream` and apply read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: lstlink_transport::TransportError) -> FrameError {
    match err {
        lstlink_transport::TransportError::Io(io)
        | lstlink_transport::TransportError::Accept(io) => FrameError::Io(io),
        lstlink_transport::TransportError::Bind { source, .. }
        | lstlink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
