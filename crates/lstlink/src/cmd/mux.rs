use lstlink_broker::{Broker, BrokerConfig};
use lstlink_transport::SerialConfig;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, MuxArgs};
use crate::exit::{broker_error, CliResult, SUCCESS};

pub fn run(args: MuxArgs) -> CliResult<i32> {
    let config = broker_config(&args)?;
    let broker =
        Broker::bind(config).map_err(|err| broker_error("cannot create broker sockets", err))?;
    install_ctrlc_handler(broker.stop_handle())?;

    let serial = SerialConfig {
        baud_rate: args.baud,
        ..SerialConfig::default()
    };
    info!(device = %args.device, baud = args.baud, "broker starting");
    let stats = broker
        .run_serial(&args.device, &serial)
        .map_err(|err| broker_error("broker failed", err))?;

    info!(
        from_device = stats.from_device,
        to_device = stats.to_device,
        "broker stopped"
    );
    Ok(SUCCESS)
}

fn broker_config(args: &MuxArgs) -> CliResult<BrokerConfig> {
    let (rx, tx, echo) = args.endpoints();
    let mut config = BrokerConfig::from_endpoints(rx, tx, echo)
        .map_err(|err| broker_error("invalid socket", err))?;
    if let Some(mode) = args.mode {
        config = config.with_socket_mode(mode);
    }
    if let (Some(user), Some(group)) = (&args.user, &args.group) {
        config = config.with_owner(user.as_str(), group.as_str());
    }
    Ok(config)
}
