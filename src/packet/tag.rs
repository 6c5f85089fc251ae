//! Out-of-band packet tags.
//!
//! Tags ride along with a packet without being part of its wire bytes,
//! e.g. the virtual time a datagram left its sender.

use std::fmt;

use crate::time::VirtualTime;

/// Key identifying a tag; a packet carries at most one tag per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKind {
    SendTimestamp,
    FlowId,
    SequenceNumber,
}

/// A side-channel value attached to a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketTag {
    /// Virtual time at which the originating application sent the packet.
    SendTimestamp(VirtualTime),
    /// Application-defined flow identifier.
    FlowId(u32),
    /// Position of the packet within its sender's schedule, from 1.
    SequenceNumber(u64),
}

impl PacketTag {
    pub fn kind(&self) -> TagKind {
        match self {
            PacketTag::SendTimestamp(_) => TagKind::SendTimestamp,
            PacketTag::FlowId(_) => TagKind::FlowId,
            PacketTag::SequenceNumber(_) => TagKind::SequenceNumber,
        }
    }
}

impl fmt::Display for PacketTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketTag::SendTimestamp(t) => write!(f, "sent@{}", t),
            PacketTag::FlowId(id) => write!(f, "flow#{}", id),
            PacketTag::SequenceNumber(n) => write!(f, "seq#{}", n),
        }
    }
}
