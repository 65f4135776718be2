use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use lstlink_flash::layout::FLASH_SIGNATURE_LEN;
use lstlink_flash::{parse_key, signature, FlashConfig, FlashImage, Flasher, KEY_LEN};
use lstlink_session::{DeviceRegistry, SessionConfig};
use tracing::info;

use crate::cmd::sign::read_hex;
use crate::cmd::{install_ctrlc_handler, open_session, FlashArgs};
use crate::exit::{flash_error, image_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_flash_report, OutputFormat};

pub fn run(args: FlashArgs, format: OutputFormat) -> CliResult<i32> {
    let application = read_hex(&args.firmware)?;
    let signature = resolve_signature(&args, &application)?;
    info!(firmware = %args.firmware.display(), "read firmware image");

    let cancel = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&cancel))?;

    let registry = DeviceRegistry::default();
    let session_config = SessionConfig::default().with_cancel(Arc::clone(&cancel));
    let session = open_session(&args.link, session_config, &registry)?;

    let config = FlashConfig::default()
        .with_max_entry_attempts(args.max_attempts)
        .with_cancel(cancel);
    let mut flasher = Flasher::with_config(session, config);
    let report = flasher
        .flash(&application, &signature)
        .map_err(|err| flash_error("flash failed", err))?;

    print_flash_report(args.link.hwid, &report, format);
    Ok(SUCCESS)
}

/// `--signature`, then `--signature-file`, then signing with the key.
fn resolve_signature(
    args: &FlashArgs,
    application: &FlashImage,
) -> CliResult<[u8; FLASH_SIGNATURE_LEN]> {
    if let Some(text) = &args.signature {
        return parse_key(text.trim()).map_err(|err| image_error("invalid --signature", err));
    }
    if let Some(path) = &args.signature_file {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?;
        return parse_key(text.trim())
            .map_err(|err| image_error(&format!("invalid signature in {}", path.display()), err));
    }
    if let Some(key) = &args.signing_key {
        let key = parse_key::<KEY_LEN>(key.trim())
            .map_err(|err| image_error("invalid signing key", err))?;
        return signature(application, &key).map_err(|err| image_error("cannot sign", err));
    }
    Err(CliError::new(
        USAGE,
        "one of --signature, --signature-file or --signing-key is required",
    ))
}
