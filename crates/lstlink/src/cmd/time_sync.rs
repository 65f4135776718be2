use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lstlink_session::{DeviceRegistry, SessionConfig};
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, open_session, TimeSyncArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_reply, OutputFormat};

/// The J2000 epoch, 2000-01-01 11:58:55.816 UTC, as Unix time.
pub const J2000: Duration = Duration::new(946_727_935, 816_000_000);

/// Each attempt carries a fresh timestamp, so the wait stays short.
const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// `(seconds, nanoseconds)` since J2000, at microsecond resolution.
pub fn j2000_time(now: SystemTime) -> CliResult<(u32, u32)> {
    let unix = now
        .duration_since(UNIX_EPOCH)
        .map_err(|err| CliError::new(INTERNAL, format!("system clock is before 1970: {err}")))?;
    let since = unix
        .checked_sub(J2000)
        .ok_or_else(|| CliError::new(INTERNAL, "system clock is before J2000"))?;
    let seconds = u32::try_from(since.as_secs())
        .map_err(|_| CliError::new(INTERNAL, "time since J2000 does not fit 32 bits"))?;
    Ok((seconds, since.subsec_micros() * 1000))
}

pub fn run(args: TimeSyncArgs, format: OutputFormat) -> CliResult<i32> {
    let cancel = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&cancel))?;
    let config = SessionConfig::default().with_cancel(cancel);

    let registry = DeviceRegistry::default();
    let mut session = open_session(&args.link, config, &registry)?;

    let mut attempts = 0usize;
    loop {
        let (seconds, nanos) = j2000_time(SystemTime::now())?;
        let command = format!("lst set_time {seconds} {nanos}");
        attempts += 1;
        debug!(attempts, command = %command, "sending time");

        let reply = session
            .send_once(&command, ATTEMPT_TIMEOUT)
            .map_err(|err| session_error("time sync failed", err))?;
        if let Some(reply) = reply {
            info!(attempts, "clock set");
            print_reply(args.link.hwid, &command, &reply, format);
            return Ok(SUCCESS);
        }

        if args.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(CliError::new(
                TIMEOUT,
                format!("no response to set_time after {attempts} attempts"),
            ));
        }
    }
}
