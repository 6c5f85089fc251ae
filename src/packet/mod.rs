//! Packet model: immutable payload bytes, a header stack and tags.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`header`] | [`Header`], [`Ipv4Header`], [`UdpHeader`] |
//! | [`tag`] | [`PacketTag`], [`TagKind`] |

pub mod header;
pub mod tag;

pub use header::{Header, Ipv4Header, UdpHeader, DEFAULT_TTL, PROTOCOL_UDP};
pub use tag::{PacketTag, TagKind};

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::time::{SimDuration, VirtualTime};

/// A simulated packet.
///
/// The payload is a shared, immutable `Bytes` buffer: layers push and pop
/// headers and attach tags as the packet crosses them, but never touch
/// the payload itself. The last pushed header is the outermost one.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    uid: u64,
    payload: Bytes,
    headers: Vec<Header>,
    tags: BTreeMap<TagKind, PacketTag>,
}

impl Packet {
    /// Create a packet with the given payload.
    pub fn new(uid: u64, payload: impl Into<Bytes>) -> Self {
        Packet {
            uid,
            payload: payload.into(),
            headers: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Create a packet whose payload is `size` zero bytes.
    pub fn zeroed(uid: u64, size: usize) -> Self {
        Self::new(uid, Bytes::from(vec![0u8; size]))
    }

    /// Network-wide unique identifier.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Payload plus every header currently on the stack.
    pub fn size(&self) -> usize {
        self.payload.len() + self.headers.iter().map(Header::wire_size).sum::<usize>()
    }

    // ── Headers ───────────────────────────────────────────────────

    pub fn push_header(&mut self, header: impl Into<Header>) {
        self.headers.push(header.into());
    }

    /// Remove and return the outermost header.
    pub fn pop_header(&mut self) -> Option<Header> {
        self.headers.pop()
    }

    /// The outermost header, if any.
    pub fn peek_header(&self) -> Option<&Header> {
        self.headers.last()
    }

    /// Headers from innermost to outermost.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The outermost header if it is IPv4.
    pub fn ipv4(&self) -> Option<&Ipv4Header> {
        match self.headers.last() {
            Some(Header::Ipv4(h)) => Some(h),
            _ => None,
        }
    }

    pub fn ipv4_mut(&mut self) -> Option<&mut Ipv4Header> {
        match self.headers.last_mut() {
            Some(Header::Ipv4(h)) => Some(h),
            _ => None,
        }
    }

    /// Pop the outermost header if it is IPv4; otherwise leave the stack alone.
    pub fn pop_ipv4(&mut self) -> Option<Ipv4Header> {
        match self.headers.last() {
            Some(Header::Ipv4(h)) => {
                let h = *h;
                self.headers.pop();
                Some(h)
            }
            _ => None,
        }
    }

    /// The outermost header if it is UDP.
    pub fn udp(&self) -> Option<&UdpHeader> {
        match self.headers.last() {
            Some(Header::Udp(h)) => Some(h),
            _ => None,
        }
    }

    pub fn pop_udp(&mut self) -> Option<UdpHeader> {
        match self.headers.last() {
            Some(Header::Udp(h)) => {
                let h = *h;
                self.headers.pop();
                Some(h)
            }
            _ => None,
        }
    }

    // ── Tags ──────────────────────────────────────────────────────

    /// Attach a tag, replacing any tag of the same kind. Returns the old one.
    pub fn add_tag(&mut self, tag: PacketTag) -> Option<PacketTag> {
        self.tags.insert(tag.kind(), tag)
    }

    pub fn peek_tag(&self, kind: TagKind) -> Option<&PacketTag> {
        self.tags.get(&kind)
    }

    pub fn remove_tag(&mut self, kind: TagKind) -> Option<PacketTag> {
        self.tags.remove(&kind)
    }

    pub fn tags(&self) -> impl Iterator<Item = &PacketTag> {
        self.tags.values()
    }

    /// Send time recorded by the originating application, if tagged.
    pub fn send_timestamp(&self) -> Option<VirtualTime> {
        match self.tags.get(&TagKind::SendTimestamp) {
            Some(PacketTag::SendTimestamp(t)) => Some(*t),
            _ => None,
        }
    }

    /// Virtual time elapsed between the send timestamp and `now`.
    ///
    /// `None` if the packet is untagged or `now` precedes the tag.
    pub fn elapsed_since_send(&self, now: VirtualTime) -> Option<SimDuration> {
        now.duration_since(self.send_timestamp()?)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet#{} [", self.uid)?;
        for (i, h) in self.headers.iter().rev().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", h)?;
        }
        write!(f, "] {} bytes", self.payload.len())
    }
}
