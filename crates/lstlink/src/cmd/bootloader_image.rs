use std::fs::{self, OpenOptions};
use std::io::Write;

use lstlink_flash::layout::FLASH_SIGNATURE_KEY_LEN;
use lstlink_flash::{assemble_bootloader, hexfile, parse_key, BootloaderSettings};
use tracing::info;

use crate::cmd::sign::read_hex;
use crate::cmd::BootloaderImageArgs;
use crate::exit::{image_error, io_error, CliResult, SUCCESS};

pub fn run(args: BootloaderImageArgs) -> CliResult<i32> {
    let keys = load_keys(&args)?;
    let bootloader = read_hex(&args.bootloader)?;
    let settings = BootloaderSettings {
        hwid: args.hwid,
        keys,
        reserved: args.reserved,
    };
    let image = assemble_bootloader(&bootloader, &settings)
        .map_err(|err| image_error("cannot assemble bootloader image", err))?;

    let context = format!("cannot write {}", args.out.display());
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&args.out)
        .map_err(|err| io_error(&context, err))?;
    out.write_all(hexfile::dump(&image).as_bytes())
        .map_err(|err| io_error(&context, err))?;

    info!(hwid = args.hwid, out = %args.out.display(), "bootloader image written");
    Ok(SUCCESS)
}

fn load_keys(args: &BootloaderImageArgs) -> CliResult<Vec<[u8; FLASH_SIGNATURE_KEY_LEN]>> {
    let texts: Vec<String> = match &args.key_file {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?
            .trim()
            .split(',')
            .map(|key| key.trim().to_string())
            .collect(),
        None => args.keys.clone(),
    };
    texts
        .iter()
        .map(|text| {
            parse_key(text.trim()).map_err(|err| image_error("invalid signing key", err))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args_with(keys: Vec<String>, key_file: Option<PathBuf>) -> BootloaderImageArgs {
        BootloaderImageArgs {
            keys,
            key_file,
            reserved: 0,
            hwid: 0x0171,
            out: PathBuf::from("out.hex"),
            bootloader: PathBuf::from("bootloader.hex"),
        }
    }

    #[test]
    fn keys_from_arguments() {
        let args = args_with(vec!["11".repeat(16), "22".repeat(16), "33".repeat(16)], None);
        let keys = load_keys(&args).unwrap();
        assert_eq!(keys, vec![[0x11; 16], [0x22; 16], [0x33; 16]]);
    }

    #[test]
    fn keys_from_comma_separated_file() {
        let path = std::env::temp_dir().join(format!("lstlink-keys-{}.txt", std::process::id()));
        fs::write(
            &path,
            format!("{}, {},{}\n", "aa".repeat(16), "bb".repeat(16), "cc".repeat(16)),
        )
        .unwrap();

        let keys = load_keys(&args_with(Vec::new(), Some(path.clone()))).unwrap();
        assert_eq!(keys, vec![[0xAA; 16], [0xBB; 16], [0xCC; 16]]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn short_key_is_rejected() {
        let args = args_with(vec!["11".repeat(8)], None);
        let err = load_keys(&args).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
