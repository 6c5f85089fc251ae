/// Point-to-point links with deterministic delay, jitter and loss.
///
/// Every transmission over a link is passed through [`Link::process`],
/// which draws from the network's seeded RNG, so every run with the same
/// seed makes identical delivery decisions.

use std::fmt;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::node::{InterfaceIndex, NodeId};
use crate::time::SimDuration;

// ── LinkId ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u32);

impl LinkId {
    #[inline]
    pub(crate) fn new(id: u32) -> Self {
        LinkId(id)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ── LinkConfig ────────────────────────────────────────────────────────

/// Propagation behaviour of one link, applied in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Fixed propagation delay applied to every delivered packet.
    pub delay: SimDuration,
    /// Upper bound of the uniform random delay added on top of `delay`.
    /// Actual jitter is in `[0, jitter)`.
    pub jitter: SimDuration,
    /// Probability of losing a packet, in `[0.0, 1.0]`.
    pub drop_probability: f64,
}

impl LinkConfig {
    /// Zero delay, no jitter, no loss.
    pub fn instant() -> Self {
        LinkConfig {
            delay: SimDuration::ZERO,
            jitter: SimDuration::ZERO,
            drop_probability: 0.0,
        }
    }

    /// A reliable link with a fixed delay.
    pub fn point_to_point(delay: SimDuration) -> Self {
        LinkConfig {
            delay,
            ..Self::instant()
        }
    }

    /// A lossy link with jitter, for stress testing.
    pub fn lossy(delay: SimDuration, jitter: SimDuration, drop_probability: f64) -> Self {
        LinkConfig {
            delay,
            jitter,
            drop_probability,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.delay.is_negative() || self.jitter.is_negative() {
            return Err(SimError::InvalidConfig(format!(
                "link delay {} and jitter {} must not be negative",
                self.delay, self.jitter
            )));
        }
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(SimError::InvalidConfig(format!(
                "drop probability {} is outside [0, 1]",
                self.drop_probability
            )));
        }
        Ok(())
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::point_to_point(SimDuration::from_millis(2))
    }
}

// ── LinkDecision ──────────────────────────────────────────────────────

/// The outcome of one transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkDecision {
    /// The packet arrives at the far end after `latency`.
    Delivered { latency: SimDuration },
    /// Lost according to `drop_probability`.
    DroppedByChance,
}

// ── Link ──────────────────────────────────────────────────────────────

/// One end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: NodeId,
    pub interface: InterfaceIndex,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.interface)
    }
}

/// A bidirectional link between two interfaces.
#[derive(Debug, Clone)]
pub struct Link {
    id: LinkId,
    ends: [Endpoint; 2],
    config: LinkConfig,
    delivered: u64,
    dropped: u64,
}

impl Link {
    pub(crate) fn new(id: LinkId, a: Endpoint, b: Endpoint, config: LinkConfig) -> Self {
        Link {
            id,
            ends: [a, b],
            config,
            delivered: 0,
            dropped: 0,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn ends(&self) -> [Endpoint; 2] {
        self.ends
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The opposite end from `from`, or `None` if `from` is not on this link.
    pub fn peer_of(&self, from: Endpoint) -> Option<Endpoint> {
        match self.ends {
            [a, b] if a == from => Some(b),
            [a, b] if b == from => Some(a),
            _ => None,
        }
    }

    /// Decide the fate of one packet. Consumes RNG state only when the
    /// link has loss or jitter configured.
    pub(crate) fn process(&mut self, rng: &mut StdRng) -> LinkDecision {
        if self.config.drop_probability > 0.0 && rng.gen::<f64>() < self.config.drop_probability {
            self.dropped += 1;
            return LinkDecision::DroppedByChance;
        }

        let jitter = match self.config.jitter.as_nanos() {
            n if n > 0 => SimDuration::from_nanos(rng.gen_range(0..n)),
            _ => SimDuration::ZERO,
        };
        self.delivered += 1;
        LinkDecision::Delivered {
            latency: self.config.delay + jitter,
        }
    }

    /// Packets this link has carried.
    pub fn delivered_count(&self) -> u64 {
        self.delivered
    }

    /// Packets this link has lost.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}
