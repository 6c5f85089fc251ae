//! Forwarding-layer counters.

use std::collections::BTreeMap;
use std::fmt;

/// Why the forwarding layer discarded a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    /// The routing module had no usable route.
    NoRoute,
    /// Lost on a link according to its drop probability.
    LinkLoss,
    /// Sent out of, or arrived on, an administratively down interface.
    InterfaceDown,
    /// The egress interface has no link attached.
    NoLink,
    /// TTL reached zero while forwarding.
    TtlExpired,
    /// No socket bound to the destination port.
    NoSocket,
    /// The header stack did not hold the expected IPv4/UDP headers.
    Malformed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::NoRoute => "no-route",
            DropReason::LinkLoss => "link-loss",
            DropReason::InterfaceDown => "interface-down",
            DropReason::NoLink => "no-link",
            DropReason::TtlExpired => "ttl-expired",
            DropReason::NoSocket => "no-socket",
            DropReason::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// Totals across the whole network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Packets placed on a link.
    pub transmitted: u64,
    /// Packets handed to a socket.
    pub delivered: u64,
    /// Packets relayed by an intermediate node.
    pub forwarded: u64,
    drops: BTreeMap<DropReason, u64>,
}

impl NetworkStats {
    pub(crate) fn record_drop(&mut self, reason: DropReason) {
        *self.drops.entry(reason).or_insert(0) += 1;
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_dropped(&self) -> u64 {
        self.drops.values().sum()
    }

    /// Non-zero drop counters in reason order.
    pub fn drops(&self) -> impl Iterator<Item = (DropReason, u64)> + '_ {
        self.drops.iter().map(|(r, n)| (*r, *n))
    }
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transmitted={} delivered={} forwarded={} dropped={}",
            self.transmitted,
            self.delivered,
            self.forwarded,
            self.total_dropped()
        )?;
        for (reason, n) in self.drops() {
            write!(f, " {}={}", reason, n)?;
        }
        Ok(())
    }
}
