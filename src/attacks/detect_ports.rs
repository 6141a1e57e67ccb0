//! C6: NAT-mapped port enumeration.
//!
//! For each candidate ephemeral port, induce server-side half-open
//! acceptance and see whether a spoofed SYN-ACK bounces back to us — if it
//! does, the router had no live mapping for that port (FREE); if it
//! doesn't, some other connection already occupies it (OCCUPIED).

use crate::attacks::{random_u32, send_pkt, SendParams};
use crate::error::InterfaceError;
use crate::interface::PacketSocket;
use crate::packet::{Address, Packet};
use crate::topology::Topology;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Free,
    Occupied,
}

/// Run the detection procedure for a single port.
pub fn scan_port(
    interface: &dyn PacketSocket,
    topology: &Topology,
    port: u16,
    send_params: SendParams,
    timeout: Duration,
) -> Result<RunStatus, InterfaceError> {
    let attacker_addr = Address::new(topology.attacker_ip, port);
    let router_addr = Address::new(topology.router_ip, port);

    let attacker_isn = random_u32();
    let server_isn = random_u32();

    // Drive the server into a half-open SYN-RECEIVED state for this
    // 5-tuple; TTL is tuned to die before actually reaching the server.
    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            ttl: topology.ttl_drop,
            seqno: attacker_isn,
            syn: true,
            ..Packet::default()
        },
    )?;

    // Spoof the server's SYN-ACK straight at the router's NAT-mapped port.
    let spoofed = Packet {
        src: topology.server_addr,
        dst: router_addr,
        seqno: server_isn,
        ackno: Some(attacker_isn.wrapping_add(1)),
        syn: true,
        ..Packet::default()
    };
    send_pkt(interface, send_params, &spoofed)?;

    // If the router had no mapping, it forwards the spoof straight back to
    // us with the destination rewritten to our own address.
    let expected = Packet {
        dst: attacker_addr,
        ..spoofed.clone()
    };
    let response = interface.receive(&|pkt: &Packet| !pkt.rst && *pkt == expected, timeout)?;

    // Unconditionally collapse the half-open state on the server side.
    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            ttl: topology.ttl_drop,
            seqno: attacker_isn.wrapping_add(1),
            ackno: Some(server_isn.wrapping_add(1)),
            rst: true,
            ..Packet::default()
        },
    )?;

    Ok(if response.is_some() {
        RunStatus::Free
    } else {
        RunStatus::Occupied
    })
}

/// Scan `start..=end` serially, reporting progress per `dumb_terminal`.
pub fn scan_range(
    interface: &dyn PacketSocket,
    topology: &Topology,
    start: u16,
    end: u16,
    send_params: SendParams,
    timeout: Duration,
    dumb_terminal: bool,
) -> Result<(), InterfaceError> {
    let span = info_span!("detect_ports", start, end);
    let _guard = span.enter();

    for port in start..=end {
        let status = scan_port(interface, topology, port, send_params, timeout)?;
        debug!(port, ?status, "scanned port");
        report(port, status, dumb_terminal);
        if port == u16::MAX {
            break;
        }
    }
    if !dumb_terminal {
        println!();
    }
    Ok(())
}

fn report(port: u16, status: RunStatus, dumb_terminal: bool) {
    if dumb_terminal {
        if status == RunStatus::Occupied {
            println!("{}", port);
        }
    } else {
        let label = match status {
            RunStatus::Free => "FREE",
            RunStatus::Occupied => "OCCUPIED",
        };
        print!("\r{port}: {label}\x1b[K");
        let _ = io::stdout().flush();
    }
}
