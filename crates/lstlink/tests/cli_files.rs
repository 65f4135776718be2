#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::Command;

use lstlink::flash::layout::{APPLICATION, HWID, SIGNING_KEYS};
use lstlink::flash::{hexfile, signature, FlashImage, ERASED};

const KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/lstlink-cli-{tag}-{}-{}",
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
    command.env_remove("SIGNING_KEY");
    command
}

fn application_image() -> FlashImage {
    let mut bytes = vec![ERASED; 0x8000];
    for (offset, byte) in bytes[APPLICATION.start..APPLICATION.start + 300]
        .iter_mut()
        .enumerate()
    {
        *byte = (offset % 251) as u8;
    }
    FlashImage::from_bytes(bytes).expect("image should be full size")
}

#[test]
fn version_prints_package_version() {
    let output = lstlink().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("lstlink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn sign_writes_the_application_mac() {
    let dir = unique_temp_dir("sign");
    let input = dir.join("app.hex");
    let out = dir.join("app.sig");
    let image = application_image();
    std::fs::write(&input, hexfile::dump(&image)).expect("hex should be writable");

    let output = lstlink()
        .arg("sign")
        .arg("-k")
        .arg(KEY)
        .arg(&input)
        .arg(&out)
        .output()
        .expect("sign should run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let key = lstlink::flash::parse_key::<16>(KEY).expect("key should parse");
    let expected = signature(&image, &key).expect("image should sign");
    let written = std::fs::read_to_string(&out).expect("signature should exist");
    assert_eq!(written, expected.iter().map(|b| format!("{b:02x}")).collect::<String>());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sign_takes_key_from_environment() {
    let dir = unique_temp_dir("sign-env");
    let input = dir.join("app.hex");
    let out = dir.join("app.sig");
    std::fs::write(&input, hexfile::dump(&application_image())).expect("hex should be writable");

    let output = lstlink()
        .env("SIGNING_KEY", KEY)
        .arg("sign")
        .arg(&input)
        .arg(&out)
        .output()
        .expect("sign should run");
    assert!(output.status.success());
    assert_eq!(std::fs::read_to_string(&out).expect("signature").len(), 32);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sign_with_short_key_is_usage_error() {
    let dir = unique_temp_dir("sign-short");
    let input = dir.join("app.hex");
    std::fs::write(&input, hexfile::dump(&application_image())).expect("hex should be writable");

    let output = lstlink()
        .arg("sign")
        .arg("-k")
        .arg("abcd")
        .arg(&input)
        .arg(dir.join("app.sig"))
        .output()
        .expect("sign should run");
    assert_eq!(output.status.code(), Some(64));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bootloader_image_stamps_hwid_and_keys() {
    let dir = unique_temp_dir("bootloader");
    let input = dir.join("bootloader.hex");
    let out = dir.join("stamped.hex");
    let mut bytes = vec![ERASED; 0x8000];
    bytes[..64].fill(0x02);
    let bootloader = FlashImage::from_bytes(bytes).expect("image should be full size");
    std::fs::write(&input, hexfile::dump(&bootloader)).expect("hex should be writable");

    let output = lstlink()
        .arg("bootloader-image")
        .arg("--keys")
        .arg("11".repeat(16))
        .arg("22".repeat(16))
        .arg("33".repeat(16))
        .arg("-i")
        .arg("0171")
        .arg("-o")
        .arg(&out)
        .arg(&input)
        .output()
        .expect("bootloader-image should run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = std::fs::read_to_string(&out).expect("output should exist");
    let image = hexfile::parse(&text).expect("output should be valid hex");
    assert_eq!(image.region(HWID), &[0x71, 0x01]);
    assert_eq!(&image.region(SIGNING_KEYS)[16..32], &[0x22; 16]);
    assert_eq!(&image.as_bytes()[..64], &[0x02; 64]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bootloader_image_refuses_to_overwrite() {
    let dir = unique_temp_dir("bootloader-exists");
    let input = dir.join("bootloader.hex");
    let out = dir.join("stamped.hex");
    std::fs::write(&input, hexfile::dump(&FlashImage::erased())).expect("hex should be writable");
    std::fs::write(&out, "keep me").expect("output should be writable");

    let output = lstlink()
        .arg("bootloader-image")
        .arg("--keys")
        .arg("11".repeat(16))
        .arg("22".repeat(16))
        .arg("33".repeat(16))
        .arg("-i")
        .arg("0171")
        .arg("-o")
        .arg(&out)
        .arg(&input)
        .output()
        .expect("bootloader-image should run");
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(std::fs::read_to_string(&out).expect("output"), "keep me");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bootloader_image_rejects_conflicting_build() {
    let dir = unique_temp_dir("bootloader-conflict");
    let input = dir.join("bootloader.hex");
    let out = dir.join("stamped.hex");
    let mut bytes = vec![ERASED; 0x8000];
    bytes[APPLICATION.start + 5] = 0x42;
    let bootloader = FlashImage::from_bytes(bytes).expect("image should be full size");
    std::fs::write(&input, hexfile::dump(&bootloader)).expect("hex should be writable");

    let output = lstlink()
        .arg("bootloader-image")
        .arg("--keys")
        .arg("11".repeat(16))
        .arg("22".repeat(16))
        .arg("33".repeat(16))
        .arg("-i")
        .arg("0171")
        .arg("-o")
        .arg(&out)
        .arg(&input)
        .output()
        .expect("bootloader-image should run");
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("application"));
    assert!(!out.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn mux_rejects_serial_socket_path() {
    let output = lstlink()
        .arg("mux")
        .arg("/dev/null")
        .arg("--rx-socket")
        .arg("/dev/ttyUSB9")
        .output()
        .expect("mux should run");
    assert_eq!(output.status.code(), Some(64));
}
