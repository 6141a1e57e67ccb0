//! The virtual (TUN) interface: device lifecycle, link-up synchronization,
//! bounded-deadline filtered receive, and single-shot send.
//!
//! Ownership of the tap descriptor is exclusive: `VirtualInterface` derives
//! neither `Clone` nor `Copy`. Because it holds a `std::fs::File`, ordinary
//! Rust move semantics already make the "moved-from" binding inaccessible —
//! there is no separate invalid state to guard against.

use crate::error::InterfaceError;
use crate::packet::Packet;
use socket2::{Domain, Socket, Type};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, trace};

const TUN_CLONE_DEVICE: &str = "/dev/net/tun";
/// `_IOW('T', 202, int)`, i.e. `TUNSETIFF` from `linux/if_tun.h`.
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const IFF_TUN: i16 = 0x0001;
const IFF_NO_PI: i16 = 0x1000;

const NETLINK_ROUTE: libc::c_int = 0;
const RTMGRP_LINK: libc::c_uint = 0x1;
const IFF_LOWER_UP: u32 = 0x10000;
const NLMSG_HDR_LEN: usize = mem::size_of::<NlMsgHdr>();
const IFINFOMSG_LEN: usize = mem::size_of::<IfInfoMsg>();
/// Alignment the kernel pads netlink message payloads to.
const NLMSG_ALIGNTO: usize = 4;

const READ_BUF_LEN: usize = 4096;

/// Matches `struct ifreq`'s layout for the portion `TUNSETIFF` touches: the
/// interface name followed by the flags field. Padded well past the real
/// struct's size so the kernel never reads/writes outside this buffer.
#[repr(C)]
struct IfReqFlags {
    ifr_name: [u8; 16],
    ifr_flags: i16,
    _reserved: [u8; 22],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NlMsgHdr {
    nlmsg_len: u32,
    nlmsg_type: u16,
    nlmsg_flags: u16,
    nlmsg_seq: u32,
    nlmsg_pid: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct IfInfoMsg {
    ifi_family: u8,
    __ifi_pad: u8,
    ifi_type: u16,
    ifi_index: i32,
    ifi_flags: u32,
    ifi_change: u32,
}

fn io_err(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg)
}

/// The send/receive surface the attack state machines and the send policy
/// depend on. Abstracting over this (rather than calling `VirtualInterface`
/// directly) lets attacks be driven in tests against an in-memory fake
/// instead of a real, privileged TUN device.
pub trait PacketSocket {
    /// Serialize and write `packet`. Returns `Ok(false)` if serialization
    /// is refused (over-long payload) without touching the device.
    fn send(&self, packet: &Packet) -> Result<bool, InterfaceError>;

    /// Block until a frame satisfying `filter` arrives or `timeout`
    /// elapses.
    fn receive(
        &self,
        filter: &dyn Fn(&Packet) -> bool,
        timeout: Duration,
    ) -> Result<Option<Packet>, InterfaceError>;
}

/// An open handle onto a layer-3 TUN device, ready to send and receive
/// serialized IPv4+TCP frames.
pub struct VirtualInterface {
    tap: File,
}

impl VirtualInterface {
    /// Open `device` (default `tun0`), wait for its link to come up, and
    /// retain the tap descriptor for the object's lifetime.
    pub fn open(device: &str) -> Result<VirtualInterface, InterfaceError> {
        let span = info_span!("setup", device = %device);
        let _guard = span.enter();
        info!("opening TUN device");
        let result = Self::open_inner(device).map_err(|source| InterfaceError::Setup {
            device: device.to_string(),
            source,
        });
        match &result {
            Ok(_) => info!("TUN device ready"),
            Err(err) => tracing::error!(%err, "TUN device setup failed"),
        }
        result
    }

    fn open_inner(device: &str) -> io::Result<VirtualInterface> {
        // 1. Netlink channel, bound before anything else so we can't miss
        // the link-up event.
        let nl_socket = Socket::new(
            Domain::from(libc::AF_NETLINK),
            Type::from(libc::SOCK_RAW),
            Some(socket2::Protocol::from(NETLINK_ROUTE)),
        )?;
        let nl_fd = nl_socket.as_raw_fd();

        let mut nl_addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        nl_addr.nl_family = libc::AF_NETLINK as u16;
        nl_addr.nl_groups = RTMGRP_LINK;
        let bind_rc = unsafe {
            libc::bind(
                nl_fd,
                &nl_addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if bind_rc != 0 {
            return Err(io::Error::last_os_error());
        }

        // 2. Open the TUN clone device and bind it to `device` in
        // point-to-point mode without per-packet metadata framing.
        let tap = OpenOptions::new().read(true).write(true).open(TUN_CLONE_DEVICE)?;

        let mut ifr = IfReqFlags {
            ifr_name: [0u8; 16],
            ifr_flags: IFF_TUN | IFF_NO_PI,
            _reserved: [0u8; 22],
        };
        let name_bytes = device.as_bytes();
        if name_bytes.len() >= ifr.ifr_name.len() {
            return Err(io_err("interface name too long"));
        }
        ifr.ifr_name[..name_bytes.len()].copy_from_slice(name_bytes);

        let ioctl_rc = unsafe {
            libc::ioctl(
                tap.as_raw_fd(),
                TUNSETIFF as _,
                &mut ifr as *mut IfReqFlags as *mut libc::c_void,
            )
        };
        if ioctl_rc < 0 {
            return Err(io::Error::last_os_error());
        }

        // 3. Resolve the interface's kernel index.
        let c_name = CString::new(device).map_err(|_| io_err("interface name has a NUL byte"))?;
        let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if index == 0 {
            return Err(io::Error::last_os_error());
        }

        // 4. Consume link-state events until we see ours with
        // IFF_LOWER_UP set.
        wait_for_link_up(nl_fd, index)?;

        // 5. Close the netlink channel; keep the tap descriptor.
        drop(nl_socket);

        Ok(VirtualInterface { tap })
    }

    /// A raw descriptor suitable for composition into a multi-descriptor
    /// `poll` alongside e.g. standard input.
    pub fn get_fd(&self) -> RawFd {
        self.tap.as_raw_fd()
    }
}

impl PacketSocket for VirtualInterface {
    fn send(&self, packet: &Packet) -> Result<bool, InterfaceError> {
        let frame = match packet.serialize() {
            Ok(frame) => frame,
            Err(err) => {
                trace!(%err, "emit refused: serialization rejected");
                return Ok(false);
            }
        };
        let fd = self.tap.as_raw_fd();
        let rc = unsafe { libc::write(fd, frame.as_ptr() as *const libc::c_void, frame.len()) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            tracing::error!(%err, "write to TUN device failed");
            return Err(InterfaceError::Send(err));
        }
        debug!(bytes = frame.len(), src = ?packet.src, dst = ?packet.dst, "wrote frame");
        Ok(true)
    }

    /// Block until a frame satisfying `filter` arrives, or `timeout`
    /// elapses, whichever comes first. Frames that fail to deserialize or
    /// that `filter` rejects are discarded and do not reset the budget.
    fn receive(
        &self,
        filter: &dyn Fn(&Packet) -> bool,
        timeout: Duration,
    ) -> Result<Option<Packet>, InterfaceError> {
        let mut remaining = timeout.as_millis() as i64;
        let fd = self.tap.as_raw_fd();
        let mut buf = [0u8; READ_BUF_LEN];

        loop {
            let poll_timeout = remaining.max(0) as i32;
            let start = Instant::now();

            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let rc = unsafe { libc::poll(&mut pfd, 1, poll_timeout) };

            let elapsed_ms = start.elapsed().as_millis() as i64;
            remaining -= elapsed_ms.max(1);

            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    if remaining <= 0 {
                        return Ok(None);
                    }
                    continue;
                }
                return Err(InterfaceError::Receive(err));
            }

            if rc == 0 {
                if remaining <= 0 {
                    return Ok(None);
                }
                continue;
            }

            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    if remaining <= 0 {
                        return Ok(None);
                    }
                    continue;
                }
                return Err(InterfaceError::Receive(err));
            }

            if n > 0 {
                match Packet::deserialize(&buf[..n as usize]) {
                    Some(pkt) if filter(&pkt) => return Ok(Some(pkt)),
                    Some(pkt) => trace!(src = ?pkt.src, dst = ?pkt.dst, "discarded frame: rejected by filter"),
                    None => trace!(bytes = n, "discarded frame: failed to deserialize"),
                }
            }

            if remaining <= 0 {
                return Ok(None);
            }
        }
    }
}

/// Read netlink messages from `nl_fd` until one reports `index` with
/// `IFF_LOWER_UP` set.
fn wait_for_link_up(nl_fd: RawFd, index: u32) -> io::Result<()> {
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        let n = unsafe { libc::read(nl_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        let mut offset = 0usize;
        let n = n as usize;
        while offset + NLMSG_HDR_LEN <= n {
            let hdr = unsafe { *(buf.as_ptr().add(offset) as *const NlMsgHdr) };
            let msg_len = hdr.nlmsg_len as usize;
            if msg_len < NLMSG_HDR_LEN || offset + msg_len > n {
                break;
            }
            if offset + NLMSG_HDR_LEN + IFINFOMSG_LEN <= n {
                let ifi = unsafe { *(buf.as_ptr().add(offset + NLMSG_HDR_LEN) as *const IfInfoMsg) };
                if ifi.ifi_index as u32 == index && ifi.ifi_flags & IFF_LOWER_UP != 0 {
                    return Ok(());
                }
            }
            offset += align_to(msg_len, NLMSG_ALIGNTO);
        }
    }
}

fn align_to(len: usize, align: usize) -> usize {
    (len + align - 1) & !(align - 1)
}
