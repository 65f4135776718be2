//! Direct serial links.
//!
//! A device can only be opened once, but several sessions may want to
//! talk through it. Each open device gets one [`SerialListener`] that owns
//! the read side and fans completed frames out to every attached
//! [`SerialLink`]. Listeners live in an explicit [`DeviceRegistry`].

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use lstlink_frame::{FrameError, FrameReader, FrameWriter};
use lstlink_transport::{SerialConfig, SerialDevice, TransportError};
use tracing::{debug, error, info};

use crate::error::{Result, SessionError};
use crate::link::Link;
use crate::queue::{InboundQueue, Recv};

type DeviceReader = Box<dyn Read + Send>;
type DeviceWriter = Box<dyn Write + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of one open serial device.
pub struct SerialListener {
    path: String,
    writer: Mutex<FrameWriter<DeviceWriter>>,
    reader: Mutex<FrameReader<DeviceReader>>,
    subscribers: Mutex<Vec<Weak<InboundQueue>>>,
    stop: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SerialListener {
    /// Start a listener over an already-open device.
    ///
    /// `reader` must return from `read` periodically (a read timeout), so
    /// the listener can notice [`SerialListener::stop`].
    pub fn spawn(
        path: impl Into<String>,
        reader: DeviceReader,
        writer: DeviceWriter,
    ) -> Result<Arc<Self>> {
        let path = path.into();
        let listener = Arc::new(Self {
            path: path.clone(),
            writer: Mutex::new(FrameWriter::new(writer)),
            reader: Mutex::new(FrameReader::new(reader)),
            subscribers: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
            thread: Mutex::new(None),
        });

        let worker = Arc::clone(&listener);
        let handle = std::thread::Builder::new()
            .name(format!("serial-listener {path}"))
            .spawn(move || worker.run())
            .map_err(TransportError::Io)?;
        *lock(&listener.thread) = Some(handle);
        Ok(listener)
    }

    /// Open `path` as a serial device and start listening on it.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Arc<Self>> {
        let device = SerialDevice::open(path, config)?;
        let reader = device.try_clone()?;
        Self::spawn(path, Box::new(reader), Box::new(device))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn run(&self) {
        debug!(path = %self.path, "serial listener started");
        while !self.stop.load(Ordering::Relaxed) {
            let polled = lock(&self.reader).poll_frame();
            match polled {
                Ok(Some(frame)) => self.publish(frame),
                Ok(None) => {}
                Err(err) => {
                    error!(path = %self.path, %err, "serial read failed");
                    self.close_subscribers(&err);
                    return;
                }
            }
        }
        self.close_subscribers(&"listener stopped");
        debug!(path = %self.path, "serial listener stopped");
    }

    fn publish(&self, frame: Bytes) {
        debug!(path = %self.path, packet = %hex::encode(&frame), "received");
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|weak| match weak.upgrade() {
            Some(queue) => {
                queue.push(frame.clone());
                true
            }
            None => false,
        });
    }

    fn close_subscribers(&self, reason: &dyn std::fmt::Display) {
        for queue in lock(&self.subscribers).drain(..) {
            if let Some(queue) = queue.upgrade() {
                queue.close(reason.to_string());
            }
        }
    }

    /// Attach a queue that will receive every inbound frame from now on.
    pub fn subscribe(&self, queue: &Arc<InboundQueue>) {
        if self.stop.load(Ordering::Relaxed) {
            queue.close("listener stopped");
            return;
        }
        lock(&self.subscribers).push(Arc::downgrade(queue));
    }

    /// Frame and write one packet.
    pub fn send(&self, message: &[u8]) -> Result<()> {
        debug!(path = %self.path, packet = %hex::encode(message), "sending");
        lock(&self.writer).send(message)?;
        Ok(())
    }

    /// Hand every byte already received to the subscribers.
    ///
    /// Holds the write lock so nothing new is sent while draining.
    pub fn drain(&self) -> Result<()> {
        let _writer = lock(&self.writer);
        loop {
            let polled = lock(&self.reader).poll_frame();
            match polled {
                Ok(Some(frame)) => self.publish(frame),
                Ok(None) => return Ok(()),
                Err(FrameError::ConnectionClosed) => {
                    return Err(SessionError::Disconnected(self.path.clone()))
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Ask the read thread to exit and wait for it.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers)
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for SerialListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialListener")
            .field("path", &self.path)
            .finish()
    }
}

/// Open serial devices, keyed by path.
///
/// Sessions that name the same device share its listener. Dropping the
/// registry stops every listener it opened.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    config: SerialConfig,
    devices: Mutex<HashMap<String, Arc<SerialListener>>>,
}

impl DeviceRegistry {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// The listener for `path`, opening the device on first use.
    pub fn open(&self, path: &str) -> Result<Arc<SerialListener>> {
        let mut devices = lock(&self.devices);
        if let Some(listener) = devices.get(path) {
            return Ok(Arc::clone(listener));
        }
        let listener = SerialListener::open(path, &self.config)?;
        info!(path, "serial device registered");
        devices.insert(path.to_string(), Arc::clone(&listener));
        Ok(listener)
    }

    /// Register a device opened elsewhere, e.g. a pseudo-terminal.
    pub fn attach(
        &self,
        path: &str,
        reader: DeviceReader,
        writer: DeviceWriter,
    ) -> Result<Arc<SerialListener>> {
        let listener = SerialListener::spawn(path, reader, writer)?;
        if let Some(previous) = lock(&self.devices).insert(path.to_string(), Arc::clone(&listener))
        {
            previous.stop();
        }
        Ok(listener)
    }

    pub fn len(&self) -> usize {
        lock(&self.devices).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        for (_, listener) in lock(&self.devices).drain() {
            listener.stop();
        }
    }
}

/// One session's view of a shared serial device.
#[derive(Debug)]
pub struct SerialLink {
    listener: Arc<SerialListener>,
    queue: Arc<InboundQueue>,
}

impl SerialLink {
    pub fn new(listener: Arc<SerialListener>, queue_capacity: usize) -> Self {
        let queue = Arc::new(InboundQueue::new(queue_capacity));
        listener.subscribe(&queue);
        Self { listener, queue }
    }

    pub fn listener(&self) -> &Arc<SerialListener> {
        &self.listener
    }
}

impl Link for SerialLink {
    fn send_message(&mut self, message: &[u8]) -> Result<()> {
        self.listener.send(message)
    }

    fn poll_message(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        match self.queue.recv_timeout(timeout) {
            Recv::Message(message) => Ok(Some(message)),
            Recv::Empty => Ok(None),
            Recv::Closed(reason) => Err(SessionError::Disconnected(reason)),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.listener.drain()?;
        self.queue.clear();
        Ok(())
    }
}
