mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "lstlink", version, about = "OpenLST radio ground tools")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cmd_with_split_words() {
        let cli = Cli::try_parse_from([
            "lstlink", "cmd", "-i", "0171", "lst", "set_time", "100", "-5",
        ])
        .expect("cmd args should parse");

        let Command::Cmd(args) = cli.command else {
            panic!("expected cmd");
        };
        assert_eq!(args.link.hwid, 0x0171);
        assert_eq!(args.command.join(" "), "lst set_time 100 -5");
        assert!(args.link.rx_path.starts_with("ipc://"));
    }

    #[test]
    fn cmd_requires_hwid() {
        let err = Cli::try_parse_from(["lstlink", "cmd", "lst", "reboot"])
            .expect_err("missing hwid should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_reserved_hwid() {
        let err = Cli::try_parse_from(["lstlink", "telem", "-i", "ffff"])
            .expect_err("reserved hwid should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_serial_link_paths() {
        let cli = Cli::try_parse_from([
            "lstlink",
            "telem",
            "-i",
            "1",
            "-r",
            "/dev/ttyUSB0",
            "-t",
            "/dev/ttyUSB0",
            "--retries",
            "3",
        ])
        .expect("telem args should parse");
        let Command::Telem(args) = cli.command else {
            panic!("expected telem");
        };
        assert_eq!(args.link.rx_path, "/dev/ttyUSB0");
        assert_eq!(args.reply.retries, Some(3));
    }

    #[test]
    fn rejects_conflicting_signature_sources() {
        let err = Cli::try_parse_from([
            "lstlink",
            "flash",
            "-i",
            "0171",
            "--signature",
            "00",
            "--signature-file",
            "sig.txt",
            "app.hex",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn bootloader_image_takes_three_keys() {
        let cli = Cli::try_parse_from([
            "lstlink",
            "bootloader-image",
            "--keys",
            "aa",
            "bb",
            "cc",
            "-i",
            "0171",
            "-o",
            "out.hex",
            "bootloader.hex",
        ])
        .expect("bootloader-image args should parse");
        let Command::BootloaderImage(args) = cli.command else {
            panic!("expected bootloader-image");
        };
        assert_eq!(args.keys, vec!["aa", "bb", "cc"]);
        assert_eq!(args.reserved, 0);
    }

    #[test]
    fn parses_mux_subcommand() {
        let cli = Cli::try_parse_from(["lstlink", "mux", "/dev/ttyUSB0", "--mode", "660"])
            .expect("mux args should parse");
        assert!(matches!(cli.command, Command::Mux(_)));
    }
}
