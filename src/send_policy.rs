//! Bounded-redundancy send policy: compensate for loss on the TUN↔router
//! path by duplicating each logical emission, without any ACK tracking.

use crate::error::InterfaceError;
use crate::interface::PacketSocket;
use crate::packet::Packet;
use std::thread;
use std::time::Duration;

/// Send `packet` `redundancy` times in sequence, sleeping `delay` between
/// each send (including after the last). An I/O error aborts the chain;
/// a refused (over-long) serialization is tolerated silently, matching
/// `PacketSocket::send`'s own contract.
pub fn emit(
    interface: &dyn PacketSocket,
    packet: &Packet,
    redundancy: usize,
    delay: Duration,
) -> Result<(), InterfaceError> {
    for _ in 0..redundancy {
        interface.send(packet)?;
        thread::sleep(delay);
    }
    Ok(())
}
