//! Command-line argument definitions for the four attack binaries.
//!
//! Flag names and defaults match the values documented for each attack;
//! expressed with `clap`'s derive API.

use clap::Args;
use clap::Parser;
use std::path::PathBuf;

/// Flags shared by every attack: where the topology lives, and the timing
/// knobs for the send policy and receive deadline.
#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    /// Path to the topology file describing server/router/attacker.
    #[arg(short = 't', long)]
    pub topology: PathBuf,

    /// How long to wait between sending and receiving, in milliseconds.
    #[arg(short = 'd', long, default_value_t = 500)]
    pub timeout: u64,

    /// How long to wait between sending consecutive duplicate packets, in
    /// milliseconds.
    #[arg(short = 'e', long, default_value_t = 100)]
    pub delay: u64,

    /// How many times to duplicate each logical emission.
    #[arg(short = 'r', long, default_value_t = 2)]
    pub redundancy: usize,
}

/// `detect-ports START [END] --topology PATH [--dumb-terminal]`
#[derive(Debug, Parser)]
#[command(name = "detect-ports", about = "Scan a port range for live NAT mappings")]
pub struct DetectPortsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Start of the port range to probe (inclusive).
    pub start: u16,

    /// End of the port range to probe (inclusive). Defaults to `start`.
    pub end: Option<u16>,

    /// Don't use terminal control codes; print only OCCUPIED ports, one
    /// per line.
    #[arg(long)]
    pub dumb_terminal: bool,
}

/// `hijack-stream PORT --topology PATH [--router-timeout MS]`
#[derive(Debug, Parser)]
#[command(name = "hijack-stream", about = "Evict a NAT mapping and relay the hijacked stream")]
pub struct HijackStreamArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Port of the active connection to hijack.
    pub port: u16,

    /// How long to wait before resetting the connection at the router, in
    /// milliseconds.
    #[arg(short = 'w', long, default_value_t = 1000)]
    pub router_timeout: u64,
}

/// `close-stream PORT --topology PATH [--router-timeout MS]`
#[derive(Debug, Parser)]
#[command(name = "close-stream", about = "Evict a NAT mapping and reset the victim's connection")]
pub struct CloseStreamArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Port of the active connection to evict.
    pub port: u16,

    /// How long to wait before resetting the connection at the router, in
    /// milliseconds.
    #[arg(short = 'w', long, default_value_t = 1000)]
    pub router_timeout: u64,
}

/// `test-out-of-window --topology PATH`
#[derive(Debug, Parser)]
#[command(name = "test-out-of-window", about = "Probe window acceptance with skewed sequence numbers")]
pub struct OutOfWindowArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Offset added to the attacker's sequence number on the probing PSH.
    #[arg(long, default_value_t = 0)]
    pub seqno_offset: u32,

    /// Offset added to the server's acknowledgement number on the probing
    /// PSH.
    #[arg(long, default_value_t = 0)]
    pub ackno_offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_ports_defaults_match_spec() {
        let args = DetectPortsArgs::parse_from(["detect-ports", "-t", "topo.yaml", "38088"]);
        assert_eq!(args.common.timeout, 500);
        assert_eq!(args.common.delay, 100);
        assert_eq!(args.common.redundancy, 2);
        assert_eq!(args.start, 38088);
        assert_eq!(args.end, None);
        assert!(!args.dumb_terminal);
    }

    #[test]
    fn detect_ports_end_defaults_to_start_when_absent() {
        let args = DetectPortsArgs::parse_from(["detect-ports", "-t", "topo.yaml", "100", "200"]);
        assert_eq!(args.start, 100);
        assert_eq!(args.end, Some(200));
    }

    #[test]
    fn hijack_stream_defaults_match_spec() {
        let args = HijackStreamArgs::parse_from(["hijack-stream", "-t", "topo.yaml", "2222"]);
        assert_eq!(args.port, 2222);
        assert_eq!(args.router_timeout, 1000);
    }

    #[test]
    fn missing_required_topology_is_an_error() {
        let result = HijackStreamArgs::try_parse_from(["hijack-stream", "2222"]);
        assert!(result.is_err());
    }

    #[test]
    fn out_of_window_defaults_to_zero_offsets() {
        let args = OutOfWindowArgs::parse_from(["test-out-of-window", "-t", "topo.yaml"]);
        assert_eq!(args.seqno_offset, 0);
        assert_eq!(args.ackno_offset, 0);
    }
}
