use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::Scope;

use bytes::Bytes;
use lstlink_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use lstlink_transport::{IpcStream, SerialConfig, SerialDevice, UnixDomainSocket};
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::fanout::Fanout;

/// Subscribers currently attached to each fan-out endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberCounts {
    pub broadcast: usize,
    pub echo: usize,
}

/// Packet counters since the broker started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Packets read from the device and broadcast.
    pub from_device: u64,
    /// Packets written to the device.
    pub to_device: u64,
}

/// Owner of one serial device, shared with clients over three sockets.
///
/// Threads while running:
/// - the device reader, broadcasting every inbound frame
/// - the device writer, draining the ingress queue
/// - one reader per ingress client, feeding the ingress queue
/// - the caller's thread, accepting connections and echoing outbound packets
///
/// All of them check the stop flag at least once per poll timeout.
pub struct Broker {
    config: BrokerConfig,
    ingress: UnixDomainSocket,
    broadcast: Fanout,
    echo: Fanout,
    stop: Arc<AtomicBool>,
    from_device: AtomicU64,
    to_device: AtomicU64,
}

impl Broker {
    /// Create the three endpoints.
    pub fn bind(config: BrokerConfig) -> Result<Self> {
        let ingress = bind_endpoint(&config, &config.ingress)?;
        let broadcast = bind_endpoint(&config, &config.broadcast)?;
        let echo = bind_endpoint(&config, &config.echo)?;
        info!(
            ingress = %config.ingress.display(),
            broadcast = %config.broadcast.display(),
            echo = %config.echo.display(),
            "broker endpoints ready"
        );
        Ok(Self {
            broadcast: Fanout::new("broadcast", broadcast, config.subscriber_write_timeout),
            echo: Fanout::new("echo", echo, config.subscriber_write_timeout),
            ingress,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            from_device: AtomicU64::new(0),
            to_device: AtomicU64::new(0),
        })
    }

    /// Flag that ends [`Broker::run`] once raised.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn subscriber_counts(&self) -> SubscriberCounts {
        SubscriberCounts {
            broadcast: self.broadcast.len(),
            echo: self.echo.len(),
        }
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            from_device: self.from_device.load(Ordering::Relaxed),
            to_device: self.to_device.load(Ordering::Relaxed),
        }
    }

    /// Open a serial device and run on it until stopped.
    pub fn run_serial(&self, path: &str, serial: &SerialConfig) -> Result<BrokerStats> {
        let device = SerialDevice::open(path, serial)?;
        let reader = device.try_clone()?;
        self.run(reader, device)
    }

    /// Run on an already open device until the stop flag is raised or the
    /// device fails.
    ///
    /// `reader` must time out its reads so the device reader can notice
    /// the stop flag.
    pub fn run<R, W>(&self, reader: R, writer: W) -> Result<BrokerStats>
    where
        R: Read + Send,
        W: Write + Send,
    {
        let failure: Mutex<Option<String>> = Mutex::new(None);
        let (ingress_tx, ingress_rx) = mpsc::channel::<Bytes>();
        let (device_tx, device_rx) = mpsc::channel::<Bytes>();

        std::thread::scope(|scope| -> Result<()> {
            spawn(scope, "device-reader", || {
                self.read_device(FrameReader::new(reader), &failure)
            })?;
            spawn(scope, "device-writer", || {
                self.write_device(FrameWriter::new(writer), device_rx, &failure)
            })?;

            let result = self.poll_loop(scope, &ingress_tx, &ingress_rx, &device_tx);
            // Ends every worker thread before the scope joins them.
            self.stop();
            result
        })?;

        let failure = failure.into_inner().unwrap_or_else(PoisonError::into_inner);
        let stats = self.stats();
        info!(
            from_device = stats.from_device,
            to_device = stats.to_device,
            "broker stopped"
        );
        match failure {
            Some(reason) => Err(BrokerError::Device(reason)),
            None => Ok(stats),
        }
    }

    fn poll_loop<'scope, 'env>(
        &'env self,
        scope: &'scope Scope<'scope, 'env>,
        ingress_tx: &Sender<Bytes>,
        ingress_rx: &Receiver<Bytes>,
        device_tx: &Sender<Bytes>,
    ) -> Result<()> {
        while !self.stopping() {
            while let Some(client) = self.ingress.try_accept()? {
                let queue = ingress_tx.clone();
                spawn(scope, "ingress-client", move || self.read_client(client, queue))?;
            }
            self.broadcast.accept_pending()?;
            self.echo.accept_pending()?;

            match ingress_rx.recv_timeout(self.config.poll_timeout) {
                Ok(packet) => {
                    self.echo.publish(&packet);
                    if device_tx.send(packet).is_err() {
                        // Device writer already gone; its failure is recorded.
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    fn read_device<R: Read>(&self, mut reader: FrameReader<R>, failure: &Mutex<Option<String>>) {
        while !self.stopping() {
            match reader.poll_frame() {
                Ok(Some(packet)) => {
                    debug!(packet = %hex::encode(&packet), "from device");
                    self.from_device.fetch_add(1, Ordering::Relaxed);
                    self.broadcast.publish(&packet);
                }
                Ok(None) => {}
                Err(err) => {
                    self.fail(failure, "device read", err);
                    return;
                }
            }
        }
    }

    fn write_device<W: Write>(
        &self,
        mut writer: FrameWriter<W>,
        packets: Receiver<Bytes>,
        failure: &Mutex<Option<String>>,
    ) {
        let max = self.config.device_max_payload;
        while !self.stopping() {
            let mut packet = match packets.recv_timeout(self.config.poll_timeout) {
                Ok(packet) => packet,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            };
            if packet.len() > max {
                warn!(size = packet.len(), max, "truncating oversized packet");
                packet.truncate(max);
            }
            debug!(packet = %hex::encode(&packet), "to device");
            if let Err(err) = writer.send(&packet) {
                self.fail(failure, "device write", err);
                return;
            }
            self.to_device.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn read_client(&self, client: IpcStream, queue: Sender<Bytes>) {
        let config = FrameConfig {
            read_timeout: Some(self.config.poll_timeout),
            ..FrameConfig::default()
        };
        let mut reader = match FrameReader::with_config_ipc(client, config) {
            Ok(reader) => reader,
            Err(err) => {
                warn!(%err, "ingress client setup failed");
                return;
            }
        };
        debug!("ingress client connected");
        while !self.stopping() {
            match reader.poll_frame() {
                Ok(Some(packet)) => {
                    if queue.send(packet).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(FrameError::ConnectionClosed) => {
                    debug!("ingress client disconnected");
                    return;
                }
                Err(err) => {
                    warn!(%err, "ingress client read failed");
                    return;
                }
            }
        }
    }

    fn fail(&self, failure: &Mutex<Option<String>>, what: &str, err: FrameError) {
        error!(%err, "{what} failed, stopping broker");
        let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| format!("{what}: {err}"));
        self.stop();
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("subscribers", &self.subscriber_counts())
            .field("stats", &self.stats())
            .finish()
    }
}

fn bind_endpoint(config: &BrokerConfig, path: &std::path::Path) -> Result<UnixDomainSocket> {
    let socket = match config.socket_mode {
        Some(mode) => UnixDomainSocket::bind_with_mode(path, mode)?,
        None => UnixDomainSocket::bind(path)?,
    };
    if let Some((user, group)) = &config.owner {
        socket.set_owner(user, group)?;
    }
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn spawn<'scope, 'env, F>(
    scope: &'scope Scope<'scope, 'env>,
    name: &'static str,
    f: F,
) -> Result<()>
where
    F: FnOnce() + Send + 'scope,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn_scoped(scope, f)
        .map(drop)
        .map_err(|source| BrokerError::Spawn { name, source })
}
