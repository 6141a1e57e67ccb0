//! The three core attacks, plus the ambient `close-stream` sibling that
//! evicts a mapping and resets the victim's connection outright.

pub mod close_stream;
pub mod detect_ports;
pub mod hijack;
pub mod out_of_window;

use crate::error::InterfaceError;
use crate::interface::PacketSocket;
use crate::packet::Packet;
use std::time::Duration;

/// Parameters every attack needs to drive the send policy: how many times
/// to duplicate each emission and how long to wait between duplicates.
#[derive(Debug, Clone, Copy)]
pub struct SendParams {
    pub redundancy: usize,
    pub delay: Duration,
}

/// Send `packet` honoring `params`' redundancy and delay settings. Thin
/// wrapper kept here (rather than calling `send_policy::emit` directly from
/// every attack) so each attack module reads as a plain sequence of
/// `send_pkt` calls.
pub fn send_pkt(
    interface: &dyn PacketSocket,
    params: SendParams,
    packet: &Packet,
) -> Result<(), InterfaceError> {
    crate::send_policy::emit(interface, packet, params.redundancy, params.delay)
}

/// Draw a `u32` uniformly from the low half of the sequence-number space
/// (`0..=u32::MAX / 2`), as the hijack and close-stream attacks require for
/// their spoofed ISNs.
pub fn random_low_half_u32() -> u32 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..=(u32::MAX / 2))
}

/// Draw a `u32` uniformly from the full range, for attacks with no
/// half-space restriction.
pub fn random_u32() -> u32 {
    rand::random()
}

/// Draw a random ephemeral port in the dynamic/private range.
pub fn random_ephemeral_port() -> u16 {
    use rand::Rng;
    rand::thread_rng().gen_range(49152..=u16::MAX)
}
