//! IPv4 + TCP packet codec (no options, no fragmentation).
//!
//! Addresses are kept in *host* numeric order (low byte = last dotted
//! octet). All wire translation happens explicitly in
//! [`Packet::serialize`] / [`Packet::deserialize`].

use crate::checksum::{checksum, checksum_neg, fold_and_complement};
use crate::error::CodecError;
use crate::flags::TcpFlags;

/// Maximum payload length accepted on emission.
pub const MAX_DATA_LEN: usize = 256;

const IP_HEADER_LEN: usize = 20;
const TCP_HEADER_LEN: usize = 20;

/// An IPv4 address and port pair. The IP is stored in host numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub ip: u32,
    pub port: u16,
}

impl Address {
    pub fn new(ip: u32, port: u16) -> Self {
        Self { ip, port }
    }
}

/// An in-memory description of one emittable/received IPv4+TCP frame.
#[derive(Debug, Clone)]
pub struct Packet {
    pub src: Address,
    pub dst: Address,
    pub ttl: u8,
    pub window_size: u16,
    pub seqno: u32,
    pub ackno: Option<u32>,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub data: Vec<u8>,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            src: Address::new(0, 0),
            dst: Address::new(0, 0),
            ttl: 64,
            window_size: 65535,
            seqno: 0,
            ackno: None,
            syn: false,
            fin: false,
            rst: false,
            psh: false,
            data: Vec::new(),
        }
    }
}

impl PartialEq for Packet {
    /// Everything except `ttl` matters for equality, so a sender can match a
    /// response against a template regardless of transit decrement.
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src
            && self.dst == other.dst
            && self.window_size == other.window_size
            && self.seqno == other.seqno
            && self.ackno == other.ackno
            && self.syn == other.syn
            && self.fin == other.fin
            && self.rst == other.rst
            && self.data == other.data
    }
}

impl Packet {
    /// Whether the ACK bit should be set on the wire: ackno present and
    /// not an RST (RST erases it regardless of what the caller set).
    fn ack_present(&self) -> bool {
        self.ackno.is_some() && !self.rst
    }

    /// Serialize into an IPv4+TCP frame. RST packets force an empty
    /// payload and clear ACK/SYN/FIN/PSH content beyond the ACK-presence
    /// rule above, regardless of what the caller set on those fields.
    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let data: &[u8] = if self.rst { &[] } else { &self.data };
        if data.len() > MAX_DATA_LEN {
            return Err(CodecError::PayloadTooLarge(data.len()));
        }

        let mut ip_header = self.serialize_ip_header(data.len());
        let tcp_header = self.serialize_tcp_header();
        let pseudo_header = self.serialize_pseudo_header(data.len());

        let ip_cksum = checksum(&ip_header);
        ip_header[10..12].copy_from_slice(&ip_cksum.to_be_bytes());

        let tcp_cksum = fold_and_complement(&[
            checksum_neg(&pseudo_header),
            checksum_neg(&tcp_header),
            checksum_neg(data),
        ]);
        let mut tcp_header = tcp_header;
        tcp_header[16..18].copy_from_slice(&tcp_cksum.to_be_bytes());

        let mut frame = Vec::with_capacity(IP_HEADER_LEN + TCP_HEADER_LEN + data.len());
        frame.extend_from_slice(&ip_header);
        frame.extend_from_slice(&tcp_header);
        frame.extend_from_slice(data);
        Ok(frame)
    }

    fn serialize_ip_header(&self, data_len: usize) -> Vec<u8> {
        let mut header = vec![0u8; IP_HEADER_LEN];
        header[0] = 0x45;
        header[1] = 0x00;
        header[2..4].copy_from_slice(&((IP_HEADER_LEN + TCP_HEADER_LEN + data_len) as u16).to_be_bytes());
        header[4..6].copy_from_slice(&0u16.to_be_bytes());
        header[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
        header[8] = self.ttl;
        header[9] = 0x06;
        header[10..12].copy_from_slice(&0u16.to_be_bytes());
        header[12..16].copy_from_slice(&self.src.ip.to_be_bytes());
        header[16..20].copy_from_slice(&self.dst.ip.to_be_bytes());
        header
    }

    fn serialize_tcp_header(&self) -> Vec<u8> {
        let mut header = vec![0u8; TCP_HEADER_LEN];
        header[0..2].copy_from_slice(&self.src.port.to_be_bytes());
        header[2..4].copy_from_slice(&self.dst.port.to_be_bytes());
        header[4..8].copy_from_slice(&self.seqno.to_be_bytes());
        if self.ack_present() {
            header[8..12].copy_from_slice(&self.ackno.unwrap().to_be_bytes());
        }
        header[12] = 0x50;

        let mut flags = TcpFlags::empty();
        if self.ack_present() {
            flags |= TcpFlags::ACK;
        }
        if self.rst {
            flags |= TcpFlags::RST;
        } else {
            if self.syn {
                flags |= TcpFlags::SYN;
            }
            if self.fin {
                flags |= TcpFlags::FIN;
            }
            if self.psh {
                flags |= TcpFlags::PSH;
            }
        }
        header[13] = flags.bits();

        header[14..16].copy_from_slice(&self.window_size.to_be_bytes());
        header[16..18].copy_from_slice(&0u16.to_be_bytes());
        header[18..20].copy_from_slice(&0u16.to_be_bytes());
        header
    }

    fn serialize_pseudo_header(&self, data_len: usize) -> Vec<u8> {
        let mut header = vec![0u8; 12];
        header[0..4].copy_from_slice(&self.src.ip.to_be_bytes());
        header[4..8].copy_from_slice(&self.dst.ip.to_be_bytes());
        header[8] = 0x00;
        header[9] = 0x06;
        header[10..12].copy_from_slice(&((TCP_HEADER_LEN + data_len) as u16).to_be_bytes());
        header
    }

    /// Deserialize a received frame. Any malformed input yields `None`
    /// rather than an error — on a shared medium this is routine.
    pub fn deserialize(frame: &[u8]) -> Option<Packet> {
        if frame.len() < IP_HEADER_LEN {
            return None;
        }
        if checksum(&frame[..IP_HEADER_LEN]) != 0 {
            return None;
        }
        let total_len = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        if total_len != frame.len() {
            return None;
        }
        if frame[9] != 0x06 {
            return None;
        }

        let ihl = (frame[0] & 0x0f) as usize * 4;
        if frame.len() < ihl + TCP_HEADER_LEN {
            return None;
        }
        let tcp_data = &frame[ihl..];

        let mut pseudo_header = vec![0u8; 12];
        pseudo_header[0..8].copy_from_slice(&frame[12..20]);
        pseudo_header[8] = 0x00;
        pseudo_header[9] = 0x06;
        pseudo_header[10..12].copy_from_slice(&((tcp_data.len()) as u16).to_be_bytes());

        let tcp_cksum = fold_and_complement(&[checksum_neg(&pseudo_header), checksum_neg(tcp_data)]);
        if tcp_cksum != 0 {
            return None;
        }

        let doff = (tcp_data[12] >> 4) as usize * 4;
        if doff > tcp_data.len() {
            return None;
        }

        let flags = TcpFlags::from_bits_truncate(tcp_data[13]);
        let ackno = if flags.contains(TcpFlags::ACK) {
            Some(u32::from_be_bytes([
                tcp_data[8],
                tcp_data[9],
                tcp_data[10],
                tcp_data[11],
            ]))
        } else {
            None
        };

        Some(Packet {
            src: Address::new(
                u32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]),
                u16::from_be_bytes([tcp_data[0], tcp_data[1]]),
            ),
            dst: Address::new(
                u32::from_be_bytes([frame[16], frame[17], frame[18], frame[19]]),
                u16::from_be_bytes([tcp_data[2], tcp_data[3]]),
            ),
            ttl: frame[8],
            window_size: u16::from_be_bytes([tcp_data[14], tcp_data[15]]),
            seqno: u32::from_be_bytes([tcp_data[4], tcp_data[5], tcp_data[6], tcp_data[7]]),
            ackno,
            syn: flags.contains(TcpFlags::SYN),
            fin: flags.contains(TcpFlags::FIN),
            rst: flags.contains(TcpFlags::RST),
            psh: flags.contains(TcpFlags::PSH),
            data: tcp_data[doff..].to_vec(),
        })
    }
}
