use lstlink_command::{decode, decode_fields};
use lstlink_session::DeviceRegistry;

use crate::cmd::send::{no_response, session_config};
use crate::cmd::{open_session, TelemArgs};
use crate::exit::{session_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_fields, OutputFormat};

const GET_TELEM: &str = "lst get_telem";

pub fn run(args: TelemArgs, format: OutputFormat) -> CliResult<i32> {
    let config = session_config(&args.reply)?;
    let registry = DeviceRegistry::default();
    let mut session = open_session(&args.link, config, &registry)?;

    let timeout = session.config().timeout;
    let retries = session.config().retries;
    let packet = session
        .request(GET_TELEM, timeout, retries)
        .map_err(|err| session_error("telemetry request failed", err))?
        .ok_or_else(|| no_response(GET_TELEM))?;

    let reply = decode(&packet);
    let fields = decode_fields(&packet).map_err(|err| {
        CliError::new(DATA_INVALID, format!("cannot decode '{reply}': {err}"))
    })?;
    print_fields(args.link.hwid, &reply, &fields, format);
    Ok(SUCCESS)
}
