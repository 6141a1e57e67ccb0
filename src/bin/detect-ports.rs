use clap::Parser;
use harbinger::attacks::detect_ports;
use harbinger::attacks::SendParams;
use harbinger::cli::DetectPortsArgs;
use harbinger::interface::VirtualInterface;
use harbinger::topology::Topology;
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = DetectPortsArgs::parse();

    let topology = match Topology::parse(&args.common.topology) {
        Ok(topology) => topology,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let interface = match VirtualInterface::open(&topology.interface) {
        Ok(interface) => interface,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let send_params = SendParams {
        redundancy: args.common.redundancy,
        delay: Duration::from_millis(args.common.delay),
    };
    let timeout = Duration::from_millis(args.common.timeout);
    let end = args.end.unwrap_or(args.start);

    if let Err(err) = detect_ports::scan_range(
        &interface,
        &topology,
        args.start,
        end,
        send_params,
        timeout,
        args.dumb_terminal,
    ) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
