use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use lstlink_frame::{FrameError, FrameReader};
use lstlink_transport::{Endpoint, IpcStream, UnixDomainSocket};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_packet, OutputFormat};

/// How often the main loop re-checks Ctrl-C.
const TICK: Duration = Duration::from_millis(200);

/// A packet tagged with the endpoint it came from.
type Packet = (&'static str, Vec<u8>);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&stop))?;

    let (tx, rx) = mpsc::channel::<Packet>();
    if !args.no_rx {
        subscribe("rx", &args.rx_socket, tx.clone())?;
    }
    if !args.no_echo {
        subscribe("echo", &args.echo_socket, tx.clone())?;
    }
    drop(tx);

    let mut printed = 0usize;
    while !stop.load(Ordering::SeqCst) {
        let (endpoint, packet) = match rx.recv_timeout(TICK) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(FAILURE, "broker closed every subscription"));
            }
        };

        let decoded = lstlink_command::decode(&packet);
        print_packet(endpoint, &packet, &decoded, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn subscribe(name: &'static str, endpoint: &str, tx: Sender<Packet>) -> CliResult<()> {
    let path = Endpoint::parse_ipc(endpoint)
        .map_err(|err| transport_error(&format!("invalid {name} socket"), err))?;
    let stream = UnixDomainSocket::connect(&path)
        .map_err(|err| transport_error(&format!("cannot subscribe to {name}"), err))?;
    info!(endpoint = name, path = %path.display(), "subscribed");

    std::thread::Builder::new()
        .name(format!("listen-{name}"))
        .spawn(move || forward(name, FrameReader::new(stream), &tx))
        .map_err(|err| CliError::new(INTERNAL, format!("cannot start {name} reader: {err}")))?;
    Ok(())
}

fn forward(name: &'static str, mut reader: FrameReader<IpcStream>, tx: &Sender<Packet>) {
    loop {
        match reader.read_frame() {
            Ok(frame) => {
                debug!(endpoint = name, packet = %hex::encode(&frame), "received");
                if tx.send((name, frame.to_vec())).is_err() {
                    return;
                }
            }
            Err(FrameError::ConnectionClosed) => {
                info!(endpoint = name, "broker closed the socket");
                return;
            }
            Err(err) => {
                warn!(endpoint = name, %err, "subscription failed");
                return;
            }
        }
    }
}
