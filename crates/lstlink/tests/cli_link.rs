#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lstlink::command::{decode, encode};
use lstlink::frame::{FrameReader, FrameWriter};
use lstlink::transport::UnixDomainSocket;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/lstlink-link-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn lstlink() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_lstlink"));
    command.arg("--log-level").arg("error");
    command.env_remove("RX_PATH").env_remove("TX_PATH");
    command
}

fn ipc(path: &Path) -> String {
    format!("ipc://{}", path.display())
}

/// Stands in for a broker with a radio that answers one command.
///
/// Returns the decoded request once the client has gone away.
fn fake_radio<F>(rx: &Path, tx: &Path, answer: F) -> JoinHandle<String>
where
    F: FnOnce(u16, u16) -> String + Send + 'static,
{
    let broadcast = UnixDomainSocket::bind(rx).expect("broadcast should bind");
    let ingress = UnixDomainSocket::bind(tx).expect("ingress should bind");
    thread::spawn(move || {
        let subscriber = broadcast.accept().expect("client should subscribe");
        let client = ingress.accept().expect("client should connect");
        let mut requests = FrameReader::new(client);
        let request = requests.read_frame().expect("request should arrive");

        let target = u16::from_le_bytes([request[0], request[1]]);
        let sequence = u16::from_le_bytes([request[2], request[3]]);
        let reply = encode(target, sequence, &answer(target, sequence)).expect("reply should encode");
        FrameWriter::new(subscriber)
            .send(&reply)
            .expect("reply should be delivered");

        // Hold the sockets open until the client exits.
        while requests.read_frame().is_ok() {}
        decode(&request)
    })
}

#[test]
fn cmd_prints_the_reply() {
    let dir = unique_temp_dir("cmd");
    let rx = dir.join("rx");
    let tx = dir.join("tx");
    let radio = fake_radio(&rx, &tx, |target, _| {
        assert_eq!(target, 0x0171);
        "lst ack".to_string()
    });

    let output = lstlink()
        .arg("--format")
        .arg("json")
        .arg("cmd")
        .arg("-r")
        .arg(ipc(&rx))
        .arg("-t")
        .arg(ipc(&tx))
        .arg("-i")
        .arg("0171")
        .arg("--retries")
        .arg("0")
        .arg("lst")
        .arg("set_time")
        .arg("100")
        .arg("200")
        .output()
        .expect("cmd should run");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"reply\":\"lst ack\""), "{stdout}");
    assert!(stdout.contains("\"hwid\":\"0171\""), "{stdout}");

    assert_eq!(radio.join().expect("radio thread"), "lst set_time 100 200");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn first_command_uses_sequence_seventeen() {
    let dir = unique_temp_dir("sequence");
    let rx = dir.join("rx");
    let tx = dir.join("tx");
    let radio = fake_radio(&rx, &tx, |_, sequence| {
        assert_eq!(sequence, 17);
        "lst ack".to_string()
    });

    let output = lstlink()
        .arg("--format")
        .arg("raw")
        .arg("cmd")
        .arg("-r")
        .arg(ipc(&rx))
        .arg("-t")
        .arg(ipc(&tx))
        .arg("-i")
        .arg("1")
        .arg("lst reboot")
        .output()
        .expect("cmd should run");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "lst ack");
    radio.join().expect("radio thread");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn telem_prints_named_fields() {
    let dir = unique_temp_dir("telem");
    let rx = dir.join("rx");
    let tx = dir.join("tx");
    let radio = fake_radio(&rx, &tx, |_, _| {
        "lst telem 0 3600 1 2 3 4 0 1 2 3 4 5 6 7 8 9 -60 100 -3 10 11 12 13 14 15 0 0 0 0"
            .to_string()
    });

    let output = lstlink()
        .arg("--format")
        .arg("json")
        .arg("telem")
        .arg("-r")
        .arg(ipc(&rx))
        .arg("-t")
        .arg(ipc(&tx))
        .arg("-i")
        .arg("0171")
        .arg("--retries")
        .arg("0")
        .output()
        .expect("telem should run");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value["fields"]["uptime"], 3600);
    assert_eq!(value["fields"]["last_rssi"], -60);
    assert_eq!(value["fields"]["adc9"], 9);
    assert_eq!(value["fields"]["packets_rejected_other"], 15);
    assert_eq!(value["fields"].as_object().expect("fields").len(), 29);

    assert_eq!(radio.join().expect("radio thread"), "lst get_telem");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn cmd_without_broker_is_transport_error() {
    let dir = unique_temp_dir("missing");
    let output = lstlink()
        .arg("cmd")
        .arg("-r")
        .arg(ipc(&dir.join("rx")))
        .arg("-t")
        .arg(ipc(&dir.join("tx")))
        .arg("-i")
        .arg("0171")
        .arg("lst get_time")
        .output()
        .expect("cmd should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("error: "));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unanswered_cmd_times_out() {
    let dir = unique_temp_dir("silent");
    let rx = dir.join("rx");
    let tx = dir.join("tx");
    let broadcast = UnixDomainSocket::bind(&rx).expect("broadcast should bind");
    let ingress = UnixDomainSocket::bind(&tx).expect("ingress should bind");
    let silent = thread::spawn(move || {
        let _subscriber = broadcast.accept().expect("client should subscribe");
        let client = ingress.accept().expect("client should connect");
        let mut requests = FrameReader::new(client);
        let mut seen = 0;
        while requests.read_frame().is_ok() {
            seen += 1;
        }
        seen
    });

    let output = lstlink()
        .arg("cmd")
        .arg("-r")
        .arg(ipc(&rx))
        .arg("-t")
        .arg(ipc(&tx))
        .arg("-i")
        .arg("0171")
        .arg("--timeout")
        .arg("100ms")
        .arg("--retries")
        .arg("2")
        .arg("lst get_time")
        .output()
        .expect("cmd should run");

    assert_eq!(output.status.code(), Some(124));
    assert_eq!(silent.join().expect("silent thread"), 3);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bad_timeout_is_usage_error() {
    let output = lstlink()
        .arg("cmd")
        .arg("-i")
        .arg("0171")
        .arg("--timeout")
        .arg("soon")
        .arg("lst get_time")
        .output()
        .expect("cmd should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn unknown_command_is_invalid_data() {
    let dir = unique_temp_dir("unknown");
    let rx = dir.join("rx");
    let tx = dir.join("tx");
    let _broadcast = UnixDomainSocket::bind(&rx).expect("broadcast should bind");
    let _ingress = UnixDomainSocket::bind(&tx).expect("ingress should bind");

    let output = lstlink()
        .arg("cmd")
        .arg("-r")
        .arg(ipc(&rx))
        .arg("-t")
        .arg(ipc(&tx))
        .arg("-i")
        .arg("0171")
        .arg("lst warp_drive")
        .output()
        .expect("cmd should run");
    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_prints_broadcast_traffic() {
    let dir = unique_temp_dir("listen");
    let rx = dir.join("rx");
    let echo = dir.join("echo");
    let broadcast = UnixDomainSocket::bind(&rx).expect("broadcast should bind");
    let echo_socket = UnixDomainSocket::bind(&echo).expect("echo should bind");

    let child = lstlink()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg("--rx-socket")
        .arg(ipc(&rx))
        .arg("--echo-socket")
        .arg(ipc(&echo))
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen should start");

    let subscriber = broadcast.accept().expect("listener should subscribe");
    let _echo_subscriber = echo_socket.accept().expect("listener should subscribe to echo");
    let packet = encode(0x0171, 42, "lst ack").expect("packet should encode");
    FrameWriter::new(subscriber)
        .send(&packet)
        .expect("packet should be delivered");

    let output = child.wait_with_output().expect("listen should exit");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value["endpoint"], "rx");
    assert_eq!(value["decoded"], "lst ack");
    assert_eq!(value["size"], 6);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_exits_when_broker_goes_away() {
    let dir = unique_temp_dir("listen-gone");
    let rx = dir.join("rx");
    let broadcast = UnixDomainSocket::bind(&rx).expect("broadcast should bind");

    let child = lstlink()
        .arg("listen")
        .arg("--rx-socket")
        .arg(ipc(&rx))
        .arg("--no-echo")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen should start");

    let subscriber = broadcast.accept().expect("listener should subscribe");
    thread::sleep(Duration::from_millis(50));
    drop(subscriber);

    let output = child.wait_with_output().expect("listen should exit");
    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&dir);
}
