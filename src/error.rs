//! Structured error types for simnet.
//!
//! All fallible public APIs return `Result<T, SimError>`. Callers can
//! tell programming errors (negative delays, scheduling after destroy,
//! misused sockets) from expected runtime outcomes (no route to a
//! destination) by matching on the variant.

use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

use crate::node::{InterfaceIndex, NodeId};
use crate::time::{SimDuration, VirtualTime};

/// No usable route exists toward `destination`.
///
/// An expected outcome rather than a fault: callers may retry through a
/// different path, so it is always returned to them and never swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no route to host {destination}")]
pub struct NoRouteError {
    pub destination: Ipv4Addr,
}

impl NoRouteError {
    pub fn new(destination: Ipv4Addr) -> Self {
        NoRouteError { destination }
    }
}

/// The top-level error type for the simulation kernel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    // ── Scheduling errors ─────────────────────────────────

    /// A callback was scheduled with a negative delay.
    #[error("cannot schedule with negative delay {0}")]
    NegativeDelay(SimDuration),

    /// Attempted to schedule an event before the current time.
    #[error("cannot schedule event at {requested} when current time is {current}")]
    NonCausalEvent {
        requested: VirtualTime,
        current: VirtualTime,
    },

    /// The scheduled time does not fit on the clock.
    #[error("virtual time overflow scheduling {delay} after {now}")]
    TimeOverflow { now: VirtualTime, delay: SimDuration },

    /// The simulation was destroyed; it accepts no further work.
    #[error("simulation has been destroyed")]
    Destroyed,

    /// `run` was called from inside a running callback.
    #[error("simulation is already running")]
    ReentrantRun,

    // ── Topology errors ───────────────────────────────────

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("interface {interface} not found on node {node}")]
    InterfaceNotFound {
        node: NodeId,
        interface: InterfaceIndex,
    },

    /// A route or transmission named an administratively down interface.
    #[error("interface {interface} on node {node} is down")]
    InterfaceDown {
        node: NodeId,
        interface: InterfaceIndex,
    },

    /// The interface already has a link attached.
    #[error("interface {interface} on node {node} is already connected")]
    InterfaceInUse {
        node: NodeId,
        interface: InterfaceIndex,
    },

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    // ── Routing errors ────────────────────────────────────

    #[error(transparent)]
    NoRoute(#[from] NoRouteError),

    #[error("node {0} already has a routing protocol attached")]
    RoutingAlreadyAttached(NodeId),

    #[error("node {node} has no routing protocol of type {expected}")]
    RoutingTypeMismatch {
        node: NodeId,
        expected: &'static str,
    },

    // ── Socket errors ─────────────────────────────────────

    #[error("address {0} is already in use")]
    AddressInUse(SocketAddrV4),

    #[error("address {address} does not belong to node {node}")]
    AddressNotAvailable { node: NodeId, address: Ipv4Addr },

    #[error("no ephemeral ports left on node {0}")]
    PortExhausted(NodeId),

    /// `start_sending` on a socket without a connected peer.
    #[error("socket has no connected peer")]
    PeerUnresolved,

    #[error("socket is not bound")]
    NotBound,

    // ── Configuration errors ──────────────────────────────

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Application errors ────────────────────────────────

    /// An error raised by user code inside a callback.
    #[error("application error: {0}")]
    Application(String),
}

impl SimError {
    /// Returns `true` for the recoverable "no route" outcome.
    pub fn is_no_route(&self) -> bool {
        matches!(self, SimError::NoRoute(_))
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
