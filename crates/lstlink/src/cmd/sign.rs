use std::fs;
use std::path::Path;

use lstlink_flash::{hexfile, parse_key, signature, FlashImage, KEY_LEN};
use tracing::info;

use crate::cmd::SignArgs;
use crate::exit::{image_error, io_error, CliResult, SUCCESS};

pub fn run(args: SignArgs) -> CliResult<i32> {
    let key = parse_key::<KEY_LEN>(args.signing_key.trim())
        .map_err(|err| image_error("invalid signing key", err))?;
    let image = read_hex(&args.input)?;
    let tag = signature(&image, &key).map_err(|err| image_error("cannot sign", err))?;

    fs::write(&args.output, hex::encode(tag))
        .map_err(|err| io_error(&format!("cannot write {}", args.output.display()), err))?;
    info!(output = %args.output.display(), "signature written");
    Ok(SUCCESS)
}

/// Read and parse an Intel HEX file.
pub fn read_hex(path: &Path) -> CliResult<FlashImage> {
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?;
    hexfile::parse(&text).map_err(|err| image_error(&format!("{}", path.display()), err))
}
