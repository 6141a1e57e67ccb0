use clap::Parser;
use harbinger::attacks::close_stream;
use harbinger::attacks::SendParams;
use harbinger::cli::CloseStreamArgs;
use harbinger::interface::VirtualInterface;
use harbinger::topology::Topology;
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = CloseStreamArgs::parse();

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
    let router_timeout = Duration::from_millis(args.router_timeout);

    match close_stream::run(
        &interface,
        &topology,
        args.port,
        send_params,
        timeout,
        router_timeout,
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
