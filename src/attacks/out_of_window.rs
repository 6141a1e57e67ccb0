//! C8: out-of-window probe.
//!
//! Completes a handshake, then sends a PSH whose sequence and
//! acknowledgement numbers are deliberately skewed by caller-supplied
//! offsets, to observe whether the remote's acceptance window tolerates
//! the skew.

use crate::attacks::{random_ephemeral_port, random_u32, send_pkt, SendParams};
use crate::error::InterfaceError;
use crate::interface::PacketSocket;
use crate::packet::{Address, Packet};
use crate::topology::Topology;
use std::time::Duration;
use tracing::{debug, info_span, warn};

pub struct ProbeReport {
    pub advertised_window: u16,
    pub response_observed: bool,
    pub ackno_delta: i64,
}

/// Run the handshake-then-skewed-probe procedure.
pub fn run(
    interface: &dyn PacketSocket,
    topology: &Topology,
    send_params: SendParams,
    timeout: Duration,
    seqno_offset: u32,
    ackno_offset: u32,
) -> Result<ProbeReport, InterfaceError> {
    let span = info_span!("out_of_window", seqno_offset, ackno_offset);
    let _guard = span.enter();

    let attacker_addr = Address::new(topology.attacker_ip, random_ephemeral_port());
    let attacker_isn = random_u32();

    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            seqno: attacker_isn,
            syn: true,
            ..Packet::default()
        },
    )?;

    let syn_ack = interface.receive(
        &|pkt: &Packet| {
            !pkt.rst
                && pkt.syn
                && pkt.src == topology.server_addr
                && pkt.dst == attacker_addr
                && pkt.ackno == Some(attacker_isn.wrapping_add(1))
        },
        timeout,
    )?;

    let syn_ack = match syn_ack {
        Some(pkt) => pkt,
        None => {
            warn!("handshake never completed");
            return Ok(ProbeReport {
                advertised_window: 0,
                response_observed: false,
                ackno_delta: 0,
            })
        }
    };

    let server_isn = syn_ack.seqno;
    let advertised_window = syn_ack.window_size;
    debug!(server_isn, advertised_window, "handshake completed");

    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            seqno: attacker_isn.wrapping_add(1),
            ackno: Some(server_isn.wrapping_add(1)),
            ..Packet::default()
        },
    )?;

    let probe_seqno = attacker_isn.wrapping_add(1).wrapping_add(seqno_offset);
    let probe_ackno = server_isn.wrapping_add(1).wrapping_add(ackno_offset);
    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            seqno: probe_seqno,
            ackno: Some(probe_ackno),
            psh: true,
            data: b"probe".to_vec(),
            ..Packet::default()
        },
    )?;

    let response = interface.receive(
        &|pkt: &Packet| {
            !pkt.rst && pkt.src == topology.server_addr && pkt.seqno == server_isn.wrapping_add(1)
        },
        timeout,
    )?;

    let (response_observed, ackno_delta) = match &response {
        Some(pkt) => {
            let delta = pkt.ackno.unwrap_or(0) as i64 - attacker_isn as i64;
            (true, delta)
        }
        None => (false, 0),
    };
    debug!(response_observed, ackno_delta, "probe result");

    let rst_seqno = attacker_isn.wrapping_add(2).wrapping_add(seqno_offset);
    send_pkt(
        interface,
        send_params,
        &Packet {
            src: attacker_addr,
            dst: topology.server_addr,
            ttl: topology.ttl_drop,
            seqno: rst_seqno,
            rst: true,
            ..Packet::default()
        },
    )?;

    Ok(ProbeReport {
        advertised_window,
        response_observed,
        ackno_delta,
    })
}

/// Format the report exactly as the attack prints it to standard output.
pub fn format_report(report: &ProbeReport) -> String {
    if report.response_observed {
        format!(
            "Got response. Delta: {}",
            report.ackno_delta
        )
    } else {
        "No response observed".to_string()
    }
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
    fn reports_no_response_when_handshake_never_completes() {
        let top = topology();
        let socket = ScriptedSocket {
            sent: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
        };
        let report = run(
            &socket,
            &top,
            params(),
            Duration::from_millis(5),
            0,
            0,
        )
        .unwrap();
        assert!(!report.response_observed);
    }

    /// A fake that reacts to each emitted segment in turn rather than
    /// matching a fixed script, so it can answer a run whose attacker ISN
    /// and ephemeral port are drawn at call time.
    struct ReactiveSocket {
        sent: RefCell<Vec<Packet>>,
        server_isn: u32,
        stage: RefCell<usize>,
    }

    impl PacketSocket for ReactiveSocket {
        fn send(&self, packet: &Packet) -> Result<bool, InterfaceError> {
            self.sent.borrow_mut().push(packet.clone());
            Ok(true)
        }

        fn receive(
            &self,
            filter: &dyn Fn(&Packet) -> bool,
            _timeout: Duration,
        ) -> Result<Option<Packet>, InterfaceError> {
            let mut stage = self.stage.borrow_mut();
            let sent = self.sent.borrow();
            let candidate = match *stage {
                0 => sent.iter().rev().find(|p| p.syn).map(|syn| Packet {
                    src: syn.dst,
                    dst: syn.src,
                    seqno: self.server_isn,
                    ackno: Some(syn.seqno.wrapping_add(1)),
                    syn: true,
                    window_size: 4096,
                    ..Packet::default()
                }),
                1 => sent.iter().rev().find(|p| p.psh).map(|probe| Packet {
                    src: probe.dst,
                    dst: probe.src,
                    seqno: self.server_isn.wrapping_add(1),
                    ackno: Some(probe.ackno.unwrap_or(0).wrapping_sub(1)),
                    ..Packet::default()
                }),
                _ => None,
            };
            *stage += 1;
            Ok(candidate.filter(|pkt| filter(pkt)))
        }
    }

    #[test]
    fn s4_zero_offset_probe_reports_window_and_delta() {
        let top = topology();
        let socket = ReactiveSocket {
            sent: RefCell::new(Vec::new()),
            server_isn: 0x1234_5678,
            stage: RefCell::new(0),
        };
        let report = run(&socket, &top, params(), Duration::from_millis(5), 0, 0).unwrap();
        assert_eq!(report.advertised_window, 4096);
        assert!(report.response_observed);

        let sent = socket.sent.borrow();
        let final_rst = sent.last().unwrap();
        assert!(final_rst.rst);
        let syn = sent.iter().find(|p| p.syn).unwrap();
        assert_eq!(final_rst.seqno, syn.seqno.wrapping_add(2));
    }

    #[test]
    fn format_report_matches_expected_text() {
        let observed = ProbeReport {
            advertised_window: 65535,
            response_observed: true,
            ackno_delta: 0,
        };
        assert_eq!(format_report(&observed), "Got response. Delta: 0");

        let missing = ProbeReport {
            advertised_window: 0,
            response_observed: false,
            ackno_delta: 0,
        };
        assert_eq!(format_report(&missing), "No response observed");
    }
}
