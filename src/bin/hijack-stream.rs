use clap::Parser;
use harbinger::attacks::hijack;
use harbinger::attacks::SendParams;
use harbinger::cli::HijackStreamArgs;
use harbinger::interface::VirtualInterface;
use harbinger::topology::Topology;
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = HijackStreamArgs::parse();

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
    let stdin = std::io::stdin();

    match hijack::run(
        &interface,
        &topology,
        args.port,
        send_params,
        timeout,
        router_timeout,
        stdin.as_raw_fd(),
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
