//! UDP sockets driven by scheduled events.
//!
//! A [`UdpSocket`] binds to an address on a node, optionally connects to a
//! peer, and either sends on a timed [`SendSchedule`] or one datagram at a
//! time with [`UdpSocket::send_to`]. Received datagrams are handed to the
//! receive callback from inside the delivery event.
//!
//! ```text
//!   Created ──start_sending──▶ Sending ──last send──▶ Idle
//!      │                          │  ▲                 │
//!      │                          │  └─start_sending───┘
//!      └──────────stop────────────┴──────stop──────────▶ Closed
//! ```
//!
//! Exactly one "next send" event is outstanding while `Sending`; every
//! reschedule replaces the stored handle.

pub mod apps;

pub use apps::{Arrival, EchoServer, PacketSink};

use std::cell::RefCell;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::error::{SimError, SimResult};
use crate::event::EventId;
use crate::network::Network;
use crate::node::{InterfaceIndex, NodeId};
use crate::packet::{Packet, PacketTag, UdpHeader};
use crate::simulation::Simulation;
use crate::time::SimDuration;

/// Invoked for every datagram delivered to the socket, with its source.
pub type ReceiveCallback = Box<dyn FnMut(&mut Simulation, Packet, SocketAddrV4) -> SimResult<()>>;

/// Invoked when a scheduled send fails. Returning an error aborts the run.
pub type ErrorCallback = Box<dyn FnMut(&mut Simulation, SimError) -> SimResult<()>>;

// ── State ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    Created,
    Sending,
    Idle,
    /// Terminal. Every further call is a no-op.
    Closed,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SocketState::Created => "created",
            SocketState::Sending => "sending",
            SocketState::Idle => "idle",
            SocketState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How many datagrams a schedule emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendCount {
    Bounded(u64),
    Unbounded,
}

/// Parameters for [`UdpSocket::start_sending`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendSchedule {
    /// Payload bytes per datagram.
    pub packet_size: usize,
    pub count: SendCount,
    /// Gap between consecutive sends.
    pub interval: SimDuration,
    /// Delay before the first send.
    pub start_delay: SimDuration,
    /// Attach the current virtual time as a send-timestamp tag.
    pub tag_timestamps: bool,
}

impl SendSchedule {
    pub fn new(packet_size: usize, count: SendCount, interval: SimDuration) -> Self {
        SendSchedule {
            packet_size,
            count,
            interval,
            start_delay: SimDuration::ZERO,
            tag_timestamps: true,
        }
    }

    pub fn starting_after(mut self, delay: SimDuration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.tag_timestamps = false;
        self
    }

    fn validate(&self) -> SimResult<()> {
        if self.start_delay.is_negative() {
            return Err(SimError::NegativeDelay(self.start_delay));
        }
        if self.interval.is_negative() {
            return Err(SimError::NegativeDelay(self.interval));
        }
        if self.interval.is_zero() && self.count == SendCount::Unbounded {
            return Err(SimError::InvalidConfig(
                "an unbounded send schedule needs a positive interval".into(),
            ));
        }
        Ok(())
    }
}

/// Per-socket counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketStats {
    pub sent: u64,
    pub received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Scheduled sends that failed (e.g. no route).
    pub send_errors: u64,
}

// ── SocketInner ───────────────────────────────────────────────────────

pub(crate) struct SocketInner {
    node: NodeId,
    local: Option<SocketAddrV4>,
    peer: Option<SocketAddrV4>,
    bound_interface: Option<InterfaceIndex>,
    state: SocketState,
    on_receive: Option<ReceiveCallback>,
    on_error: Option<ErrorCallback>,
    schedule: Option<SendSchedule>,
    /// `None` while the schedule is unbounded.
    remaining: Option<u64>,
    next_send: Option<EventId>,
    sequence: u64,
    stats: SocketStats,
}

/// Hand a delivered datagram to the socket's receive callback.
///
/// The callback is taken out for the duration of the call so it may use
/// the socket freely, then put back unless it installed a replacement.
pub(crate) fn deliver_datagram(
    shared: &Rc<RefCell<SocketInner>>,
    sim: &mut Simulation,
    packet: Packet,
    from: SocketAddrV4,
) -> SimResult<()> {
    let callback = {
        let mut inner = shared.borrow_mut();
        if inner.state == SocketState::Closed {
            return Ok(());
        }
        inner.stats.received += 1;
        inner.stats.bytes_received += packet.size() as u64;
        trace!(node = %inner.node, local = ?inner.local, %from, uid = packet.uid(), "datagram received");
        inner.on_receive.take()
    };
    let Some(mut callback) = callback else {
        return Ok(());
    };
    let result = callback(sim, packet, from);
    let mut inner = shared.borrow_mut();
    if inner.on_receive.is_none() {
        inner.on_receive = Some(callback);
    }
    result
}

// ── UdpSocket ─────────────────────────────────────────────────────────

/// A UDP endpoint on one node. Clones share the same socket.
#[derive(Clone)]
pub struct UdpSocket {
    inner: Rc<RefCell<SocketInner>>,
    network: Network,
}

/// Non-owning socket handle, for callbacks stored inside the socket itself.
#[derive(Clone)]
pub struct WeakUdpSocket {
    inner: Weak<RefCell<SocketInner>>,
    network: Network,
}

impl WeakUdpSocket {
    pub fn upgrade(&self) -> Option<UdpSocket> {
        self.inner.upgrade().map(|inner| UdpSocket {
            inner,
            network: self.network.clone(),
        })
    }
}

impl UdpSocket {
    /// Create an unbound socket on `node`.
    pub fn new(network: &Network, node: NodeId) -> SimResult<Self> {
        network.check_node(node)?;
        Ok(UdpSocket {
            inner: Rc::new(RefCell::new(SocketInner {
                node,
                local: None,
                peer: None,
                bound_interface: None,
                state: SocketState::Created,
                on_receive: None,
                on_error: None,
                schedule: None,
                remaining: None,
                next_send: None,
                sequence: 0,
                stats: SocketStats::default(),
            })),
            network: network.clone(),
        })
    }

    pub fn downgrade(&self) -> WeakUdpSocket {
        WeakUdpSocket {
            inner: Rc::downgrade(&self.inner),
            network: self.network.clone(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.inner.borrow().node
    }

    pub fn state(&self) -> SocketState {
        self.inner.borrow().state
    }

    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.inner.borrow().local
    }

    pub fn peer_addr(&self) -> Option<SocketAddrV4> {
        self.inner.borrow().peer
    }

    pub fn stats(&self) -> SocketStats {
        self.inner.borrow().stats
    }

    /// The outstanding send event, if any.
    pub fn pending_send(&self) -> Option<EventId> {
        self.inner.borrow().next_send
    }

    // ── Addressing ────────────────────────────────────────────────

    /// Bind to `address`. `0.0.0.0` accepts datagrams for any address of
    /// the node; port 0 picks an ephemeral port. Rebinding releases the
    /// previous address. Returns the bound address.
    ///
    /// On a closed socket nothing is bound; the last address (or
    /// `address`, if there never was one) is echoed back.
    pub fn bind(&self, address: SocketAddrV4) -> SimResult<SocketAddrV4> {
        let (node, previous, state) = {
            let inner = self.inner.borrow();
            (inner.node, inner.local, inner.state)
        };
        if state == SocketState::Closed {
            return Ok(previous.unwrap_or(address));
        }
        if previous == Some(address) {
            return Ok(address);
        }
        let bound = self
            .network
            .bind_socket(node, address, Rc::downgrade(&self.inner))?;
        if let Some(previous) = previous {
            self.network.unbind_socket(node, previous);
        }
        self.inner.borrow_mut().local = Some(bound);
        Ok(bound)
    }

    /// Pin outgoing datagrams to one egress interface. The interface is
    /// passed to routing as a hint.
    pub fn bind_to_interface(&self, index: InterfaceIndex) -> SimResult<()> {
        let node = self.node();
        self.network.check_interface(node, index)?;
        self.inner.borrow_mut().bound_interface = Some(index);
        Ok(())
    }

    /// Set the default destination. Binds to an ephemeral port first if
    /// the socket is unbound.
    pub fn connect(&self, peer: SocketAddrV4) -> SimResult<()> {
        if self.state() == SocketState::Closed {
            return Ok(());
        }
        self.ensure_bound()?;
        self.inner.borrow_mut().peer = Some(peer);
        debug!(node = %self.node(), %peer, "socket connected");
        Ok(())
    }

    pub fn set_receive_callback<F>(&self, callback: F)
    where
        F: FnMut(&mut Simulation, Packet, SocketAddrV4) -> SimResult<()> + 'static,
    {
        self.inner.borrow_mut().on_receive = Some(Box::new(callback));
    }

    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: FnMut(&mut Simulation, SimError) -> SimResult<()> + 'static,
    {
        self.inner.borrow_mut().on_error = Some(Box::new(callback));
    }

    fn ensure_bound(&self) -> SimResult<SocketAddrV4> {
        match self.local_addr() {
            Some(local) => Ok(local),
            None => self.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
        }
    }

    // ── Sending ───────────────────────────────────────────────────

    /// Send `packet` to `destination` now. Pushes the UDP header and binds
    /// to an ephemeral port if needed. A no-op on a closed socket.
    pub fn send_to(
        &self,
        sim: &mut Simulation,
        packet: Packet,
        destination: SocketAddrV4,
    ) -> SimResult<()> {
        if self.state() == SocketState::Closed {
            return Ok(());
        }
        let local = self.ensure_bound()?;
        self.transmit(sim, packet, local, destination)
    }

    /// Send `packet` to the connected peer now.
    pub fn send(&self, sim: &mut Simulation, packet: Packet) -> SimResult<()> {
        if self.state() == SocketState::Closed {
            return Ok(());
        }
        let peer = self.resolved_peer()?;
        self.send_to(sim, packet, peer)
    }

    fn resolved_peer(&self) -> SimResult<SocketAddrV4> {
        match self.peer_addr() {
            Some(peer) if !peer.ip().is_unspecified() && peer.port() != 0 => Ok(peer),
            _ => Err(SimError::PeerUnresolved),
        }
    }

    fn transmit(
        &self,
        sim: &mut Simulation,
        mut packet: Packet,
        local: SocketAddrV4,
        destination: SocketAddrV4,
    ) -> SimResult<()> {
        let (node, hint) = {
            let inner = self.inner.borrow();
            (inner.node, inner.bound_interface)
        };
        packet.push_header(UdpHeader {
            source_port: local.port(),
            destination_port: destination.port(),
        });
        let size = packet.size() as u64;
        self.network
            .send(sim, node, packet, *local.ip(), *destination.ip(), hint)?;

        let mut inner = self.inner.borrow_mut();
        inner.stats.sent += 1;
        inner.stats.bytes_sent += size;
        Ok(())
    }

    /// Start emitting datagrams to the connected peer on `schedule`.
    ///
    /// Rejects an unresolved peer synchronously. Replaces any schedule
    /// already running. A no-op on a closed socket.
    pub fn start_sending(&self, sim: &mut Simulation, schedule: SendSchedule) -> SimResult<()> {
        if self.state() == SocketState::Closed {
            return Ok(());
        }
        let peer = self.resolved_peer()?;
        schedule.validate()?;

        let stale = {
            let mut inner = self.inner.borrow_mut();
            inner.schedule = Some(schedule);
            inner.remaining = match schedule.count {
                SendCount::Bounded(n) => Some(n),
                SendCount::Unbounded => None,
            };
            inner.next_send.take()
        };
        if let Some(stale) = stale {
            sim.cancel(stale);
        }

        if schedule.count == SendCount::Bounded(0) {
            self.inner.borrow_mut().state = SocketState::Idle;
            return Ok(());
        }
        self.inner.borrow_mut().state = SocketState::Sending;
        debug!(node = %self.node(), %peer, ?schedule.count, interval = %schedule.interval, "sending started");
        Self::arm(&self.inner, &self.network, sim, schedule.start_delay)
    }

    /// Schedule the next send, replacing the stored handle.
    fn arm(
        shared: &Rc<RefCell<SocketInner>>,
        network: &Network,
        sim: &mut Simulation,
        delay: SimDuration,
    ) -> SimResult<()> {
        let weak = WeakUdpSocket {
            inner: Rc::downgrade(shared),
            network: network.clone(),
        };
        let id = sim.schedule(delay, move |sim: &mut Simulation| match weak.upgrade() {
            Some(socket) => socket.fire_send(sim),
            None => Ok(()),
        })?;
        let stale = shared.borrow_mut().next_send.replace(id);
        if let Some(stale) = stale {
            sim.cancel(stale);
        }
        Ok(())
    }

    /// One firing of the send schedule.
    fn fire_send(&self, sim: &mut Simulation) -> SimResult<()> {
        let (schedule, sequence) = {
            let mut inner = self.inner.borrow_mut();
            inner.next_send = None;
            // A stop may have landed between scheduling and firing.
            if inner.state != SocketState::Sending {
                return Ok(());
            }
            let Some(schedule) = inner.schedule else {
                return Ok(());
            };
            inner.sequence += 1;
            (schedule, inner.sequence)
        };

        let mut packet = Packet::zeroed(self.network.next_packet_uid(), schedule.packet_size);
        packet.add_tag(PacketTag::SequenceNumber(sequence));
        if schedule.tag_timestamps {
            packet.add_tag(PacketTag::SendTimestamp(sim.now()));
        }
        let outcome = self.send(sim, packet);

        let more = {
            let mut inner = self.inner.borrow_mut();
            if let Some(remaining) = inner.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            let more = inner.remaining != Some(0) && inner.state == SocketState::Sending;
            if !more && inner.state == SocketState::Sending {
                inner.state = SocketState::Idle;
            }
            more
        };

        if let Err(err) = outcome {
            self.inner.borrow_mut().stats.send_errors += 1;
            if let Err(err) = self.report(sim, err) {
                // Nothing is scheduled any more; a resumed run must not
                // find the socket claiming to send.
                let mut inner = self.inner.borrow_mut();
                if inner.state == SocketState::Sending && inner.next_send.is_none() {
                    inner.state = SocketState::Idle;
                }
                return Err(err);
            }
        }
        // The error callback may have stopped or restarted the socket.
        let (state, rearmed) = {
            let inner = self.inner.borrow();
            (inner.state, inner.next_send.is_some())
        };
        if more && state == SocketState::Sending && !rearmed {
            Self::arm(&self.inner, &self.network, sim, schedule.interval)?;
        }
        Ok(())
    }

    /// Route a send failure to the error callback, or abort the run.
    fn report(&self, sim: &mut Simulation, err: SimError) -> SimResult<()> {
        let callback = self.inner.borrow_mut().on_error.take();
        let Some(mut callback) = callback else {
            warn!(node = %self.node(), %err, "scheduled send failed");
            return Err(err);
        };
        let result = callback(sim, err);
        let mut inner = self.inner.borrow_mut();
        if inner.on_error.is_none() {
            inner.on_error = Some(callback);
        }
        result
    }

    /// Cancel any pending send, release the bound address and close.
    pub fn stop(&self, sim: &mut Simulation) {
        let (node, local, pending) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == SocketState::Closed {
                return;
            }
            inner.state = SocketState::Closed;
            (inner.node, inner.local, inner.next_send.take())
        };
        if let Some(pending) = pending {
            sim.cancel(pending);
        }
        if let Some(local) = local {
            self.network.unbind_socket(node, local);
        }
        debug!(%node, ?local, "socket closed");
    }
}

impl fmt::Debug for UdpSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("UdpSocket")
            .field("node", &inner.node)
            .field("local", &inner.local)
            .field("peer", &inner.peer)
            .field("state", &inner.state)
            .field("stats", &inner.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Endpoint, LinkConfig};
    use crate::routing::StaticRouting;
    use testresult::TestResult;

    const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    /// Two nodes on one instant link, each with a host route to the other.
    fn pair(sim: &mut Simulation) -> SimResult<(Network, NodeId, NodeId)> {
        let net = Network::new(1);
        let a = net.add_node();
        let b = net.add_node();
        let ia = net.add_interface(a, A)?;
        let ib = net.add_interface(b, B)?;
        net.connect(
            Endpoint { node: a, interface: ia },
            Endpoint { node: b, interface: ib },
            LinkConfig::instant(),
        )?;
        let to_b = crate::routing::Route::new(B, B, ia, 1.0);
        let to_a = crate::routing::Route::new(A, A, ib, 1.0);
        net.attach_routing(sim, a, StaticRouting::new().with_route(to_b))?;
        net.attach_routing(sim, b, StaticRouting::new().with_route(to_a))?;
        Ok((net, a, b))
    }

    #[test]
    fn test_start_sending_requires_peer() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;

        let schedule = SendSchedule::new(10, SendCount::Bounded(1), SimDuration::from_secs(1));
        assert_eq!(socket.start_sending(&mut sim, schedule), Err(SimError::PeerUnresolved));

        socket.connect(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9))?;
        assert_eq!(socket.start_sending(&mut sim, schedule), Err(SimError::PeerUnresolved));
        assert_eq!(socket.state(), SocketState::Created);
        assert_eq!(sim.pending_events(), 0);
        Ok(())
    }

    #[test]
    fn test_bind_rules() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;

        let s1 = UdpSocket::new(&net, a)?;
        s1.bind(SocketAddrV4::new(A, 9))?;

        let s2 = UdpSocket::new(&net, a)?;
        assert_eq!(
            s2.bind(SocketAddrV4::new(A, 9)),
            Err(SimError::AddressInUse(SocketAddrV4::new(A, 9)))
        );
        assert!(matches!(
            s2.bind(SocketAddrV4::new(B, 9)),
            Err(SimError::AddressNotAvailable { .. })
        ));

        let eph = s2.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
        assert!(eph.port() >= 32768);

        // Closing releases the port.
        s1.stop(&mut sim);
        let s3 = UdpSocket::new(&net, a)?;
        s3.bind(SocketAddrV4::new(A, 9))?;
        Ok(())
    }

    #[test]
    fn test_dropped_socket_releases_port() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        {
            let s = UdpSocket::new(&net, a)?;
            s.bind(SocketAddrV4::new(A, 7))?;
        }
        UdpSocket::new(&net, a)?.bind(SocketAddrV4::new(A, 7))?;
        Ok(())
    }

    #[test]
    fn test_single_outstanding_send_event() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.connect(SocketAddrV4::new(B, 9))?;

        let schedule = SendSchedule::new(10, SendCount::Unbounded, SimDuration::from_secs(1));
        socket.start_sending(&mut sim, schedule)?;
        let first = socket.pending_send().unwrap();
        socket.start_sending(&mut sim, schedule)?;
        let second = socket.pending_send().unwrap();

        assert_ne!(first, second);
        assert!(!sim.is_pending(first));
        assert_eq!(sim.pending_events(), 1);
        Ok(())
    }

    #[test]
    fn test_stop_cancels_and_closes() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.connect(SocketAddrV4::new(B, 9))?;
        socket.start_sending(
            &mut sim,
            SendSchedule::new(10, SendCount::Unbounded, SimDuration::from_secs(1)),
        )?;

        let stopper = socket.clone();
        sim.schedule(SimDuration::from_millis(2500), move |sim: &mut Simulation| {
            stopper.stop(sim);
            Ok(())
        })?;
        sim.run(Some(crate::time::VirtualTime::from_secs(10)))?;

        // Sends at 0s, 1s and 2s only.
        assert_eq!(socket.stats().sent, 3);
        assert_eq!(socket.state(), SocketState::Closed);
        assert!(socket.pending_send().is_none());

        // Further calls are no-ops.
        assert_eq!(socket.bind(SocketAddrV4::new(A, 40))?, socket.local_addr().unwrap());
        socket.start_sending(
            &mut sim,
            SendSchedule::new(10, SendCount::Bounded(1), SimDuration::from_secs(1)),
        )?;
        assert_eq!(socket.state(), SocketState::Closed);
        assert_eq!(sim.pending_events(), 0);
        Ok(())
    }

    #[test]
    fn test_stop_racing_fired_event() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.connect(SocketAddrV4::new(B, 9))?;

        // Stop is queued at t=1s before the send that fires at t=1s.
        let stopper = socket.clone();
        sim.schedule(SimDuration::from_secs(1), move |sim: &mut Simulation| {
            stopper.stop(sim);
            Ok(())
        })?;
        socket.start_sending(
            &mut sim,
            SendSchedule::new(10, SendCount::Bounded(5), SimDuration::from_secs(1)),
        )?;
        sim.run(None)?;

        assert_eq!(socket.stats().sent, 1);
        Ok(())
    }

    #[test]
    fn test_no_route_without_error_callback_aborts_run() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.connect(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 9))?;
        socket.start_sending(
            &mut sim,
            SendSchedule::new(10, SendCount::Bounded(3), SimDuration::from_secs(1)),
        )?;

        let err = sim.run(None).unwrap_err();
        assert!(err.is_no_route());
        assert_eq!(socket.stats().sent, 0);

        // The socket is left idle with nothing scheduled.
        assert_eq!(socket.state(), SocketState::Idle);
        assert!(socket.pending_send().is_none());
        assert_eq!(sim.run(None)?, 0);
        assert_eq!(socket.stats().send_errors, 1);
        Ok(())
    }

    #[test]
    fn test_aborted_schedule_can_be_restarted() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.connect(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 9))?;
        let schedule = SendSchedule::new(10, SendCount::Bounded(3), SimDuration::from_secs(1));
        socket.start_sending(&mut sim, schedule)?;
        assert!(sim.run(None).is_err());

        socket.connect(SocketAddrV4::new(B, 9))?;
        socket.start_sending(&mut sim, schedule)?;
        assert_eq!(socket.state(), SocketState::Sending);
        sim.run(None)?;

        assert_eq!(socket.stats().sent, 3);
        assert_eq!(socket.state(), SocketState::Idle);
        Ok(())
    }

    #[test]
    fn test_error_callback_restart_keeps_one_send_event() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.connect(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 9))?;

        let schedule = SendSchedule::new(10, SendCount::Bounded(3), SimDuration::from_secs(1));
        let again = socket.downgrade();
        let restarted = Rc::new(RefCell::new(false));
        let flag = restarted.clone();
        socket.set_error_callback(move |sim, _err| {
            if !*flag.borrow() {
                *flag.borrow_mut() = true;
                if let Some(socket) = again.upgrade() {
                    socket.start_sending(sim, schedule.starting_after(SimDuration::from_millis(500)))?;
                }
            }
            Ok(())
        });
        socket.start_sending(&mut sim, schedule)?;

        assert!(sim.step()?.is_some());
        assert!(*restarted.borrow());
        assert_eq!(sim.pending_events(), 1);
        let pending = socket.pending_send().unwrap();
        assert_eq!(sim.delay_left(pending), Some(SimDuration::from_millis(500)));

        // The restarted schedule runs to completion on its own.
        sim.run(None)?;
        assert_eq!(socket.stats().send_errors, 4);
        assert_eq!(socket.state(), SocketState::Idle);
        Ok(())
    }

    #[test]
    fn test_no_route_goes_to_error_callback() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.connect(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 9))?;

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        socket.set_error_callback(move |_sim, err| {
            sink.borrow_mut().push(err);
            Ok(())
        });
        socket.start_sending(
            &mut sim,
            SendSchedule::new(10, SendCount::Bounded(3), SimDuration::from_secs(1)),
        )?;
        sim.run(None)?;

        assert_eq!(errors.borrow().len(), 3);
        assert!(errors.borrow().iter().all(SimError::is_no_route));
        assert_eq!(socket.stats().send_errors, 3);
        assert_eq!(socket.state(), SocketState::Idle);
        Ok(())
    }

    #[test]
    fn test_bind_on_closed_socket_is_noop() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, _) = pair(&mut sim)?;
        let socket = UdpSocket::new(&net, a)?;
        socket.stop(&mut sim);

        let wanted = SocketAddrV4::new(A, 9);
        assert_eq!(socket.bind(wanted)?, wanted);
        assert_eq!(socket.local_addr(), None);
        // The port was never taken.
        UdpSocket::new(&net, a)?.bind(wanted)?;
        Ok(())
    }

    #[test]
    fn test_schedule_numbers_packets_from_one() -> TestResult {
        use crate::packet::TagKind;

        let mut sim = Simulation::new();
        let (net, a, b) = pair(&mut sim)?;
        let rx = UdpSocket::new(&net, b)?;
        rx.bind(SocketAddrV4::new(B, 9))?;
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        rx.set_receive_callback(move |_sim, packet, _from| {
            if let Some(PacketTag::SequenceNumber(n)) = packet.peek_tag(TagKind::SequenceNumber) {
                sink.borrow_mut().push(*n);
            }
            Ok(())
        });

        let tx = UdpSocket::new(&net, a)?;
        tx.connect(SocketAddrV4::new(B, 9))?;
        tx.start_sending(
            &mut sim,
            SendSchedule::new(10, SendCount::Bounded(3), SimDuration::from_secs(1)),
        )?;
        sim.run(None)?;

        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_receive_without_callback_counts() -> TestResult {
        let mut sim = Simulation::new();
        let (net, a, b) = pair(&mut sim)?;
        let rx = UdpSocket::new(&net, b)?;
        rx.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9))?;
        let tx = UdpSocket::new(&net, a)?;

        tx.send_to(&mut sim, Packet::new(1, &b"hello"[..]), SocketAddrV4::new(B, 9))?;
        sim.run(None)?;

        assert_eq!(rx.stats().received, 1);
        assert_eq!(tx.stats().sent, 1);
        Ok(())
    }
}
