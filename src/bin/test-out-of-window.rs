use clap::Parser;
use harbinger::attacks::out_of_window;
use harbinger::attacks::SendParams;
use harbinger::cli::OutOfWindowArgs;
use harbinger::interface::VirtualInterface;
use harbinger::topology::Topology;
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = OutOfWindowArgs::parse();

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

    let report = match out_of_window::run(
        &interface,
        &topology,
        send_params,
        timeout,
        args.seqno_offset,
        args.ackno_offset,
    ) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!("Advertised window: {}", report.advertised_window);
    println!("{}", out_of_window::format_report(&report));

    ExitCode::SUCCESS
}
