use lstlink_session::{DeviceRegistry, SessionConfig};
use tracing::info;

use crate::cmd::{open_session, parse_duration, CmdArgs, ReplyArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: CmdArgs, format: OutputFormat) -> CliResult<i32> {
    let command = args.command.join(" ");
    let config = session_config(&args.reply)?;

    let registry = DeviceRegistry::default();
    let mut session = open_session(&args.link, config, &registry)?;
    info!(hwid = session.target_id(), command = %command, "sending");

    let reply = session
        .send(&command)
        .map_err(|err| session_error("command failed", err))?
        .ok_or_else(|| no_response(&command))?;

    print_reply(args.link.hwid, &command, &reply, format);
    Ok(SUCCESS)
}

/// Session settings from `--timeout` and `--retries`.
pub fn session_config(reply: &ReplyArgs) -> CliResult<SessionConfig> {
    let timeout = parse_duration(&reply.timeout)?;
    Ok(SessionConfig::default()
        .with_timeout(Some(timeout))
        .with_retries(reply.retries))
}

pub fn no_response(command: &str) -> CliError {
    CliError::new(TIMEOUT, format!("no response to '{command}'"))
}
