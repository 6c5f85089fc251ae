//! Protocol headers carried on a [`Packet`](super::Packet)'s header stack.

use std::fmt;
use std::net::Ipv4Addr;

/// IANA protocol number for UDP.
pub const PROTOCOL_UDP: u8 = 17;

/// Default time-to-live for locally originated packets.
pub const DEFAULT_TTL: u8 = 64;

// ── Ipv4Header ────────────────────────────────────────────────────────

/// Network-layer header. Consulted by the routing module on every hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Header {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub protocol: u8,
}

impl Ipv4Header {
    pub const WIRE_SIZE: usize = 20;

    /// A UDP-carrying header with the default TTL.
    pub fn udp(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Ipv4Header {
            source,
            destination,
            ttl: DEFAULT_TTL,
            protocol: PROTOCOL_UDP,
        }
    }
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4({} > {}, ttl={}, proto={})",
            self.source, self.destination, self.ttl, self.protocol
        )
    }
}

// ── UdpHeader ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
}

impl UdpHeader {
    pub const WIRE_SIZE: usize = 8;
}

impl fmt::Display for UdpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UDP({} > {})", self.source_port, self.destination_port)
    }
}

// ── Header ────────────────────────────────────────────────────────────

/// One entry on a packet's header stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Header {
    Ipv4(Ipv4Header),
    Udp(UdpHeader),
}

impl Header {
    /// Size the header would occupy on the wire.
    pub fn wire_size(&self) -> usize {
        match self {
            Header::Ipv4(_) => Ipv4Header::WIRE_SIZE,
            Header::Udp(_) => UdpHeader::WIRE_SIZE,
        }
    }
}

impl From<Ipv4Header> for Header {
    fn from(h: Ipv4Header) -> Self {
        Header::Ipv4(h)
    }
}

impl From<UdpHeader> for Header {
    fn from(h: UdpHeader) -> Self {
        Header::Udp(h)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Header::Ipv4(h) => h.fmt(f),
            Header::Udp(h) => h.fmt(f),
        }
    }
}
