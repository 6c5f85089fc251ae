//! Distance-vector routing learned from neighbour advertisements.
//!
//! Every `interval` a [`DistanceVectorRouting`] instance sends each
//! configured neighbour its full table over UDP, and learns next hops from
//! the tables its neighbours send back. Routes leaving through the
//! interface an advertisement goes out on are advertised at
//! [`INFINITE_METRIC`] (poison reverse). Exactly one update event is
//! outstanding while the module is active.
//!
//! The module owns a [`UdpSocket`] bound at construction. The socket
//! moves into the update event at attach, so cancelling that event in
//! `detach` also releases the port.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{SimError, SimResult};
use crate::event::EventId;
use crate::network::{Network, WeakNetwork};
use crate::node::{interface, Interface, InterfaceIndex, NodeId};
use crate::packet::Packet;
use crate::simulation::Simulation;
use crate::socket::UdpSocket;
use crate::time::{SimDuration, VirtualTime};

use super::{Route, RoutingProtocol, RoutingState, RoutingTable};

/// Cost at and above which a destination counts as unreachable.
pub const INFINITE_METRIC: f64 = 16.0;

/// Default UDP port for advertisements.
pub const DEFAULT_PORT: u16 = 520;

/// One entry of an advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Advert {
    pub destination: Ipv4Addr,
    pub cost: f64,
}

/// A directly connected peer.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Neighbor {
    address: Ipv4Addr,
    egress: InterfaceIndex,
    cost: f64,
}

struct DvState {
    node: NodeId,
    interval: SimDuration,
    port: u16,
    network: WeakNetwork,
    /// Held until attach moves it into the update event.
    socket: Option<UdpSocket>,
    neighbors: Vec<Neighbor>,
    local: Vec<Ipv4Addr>,
    down: BTreeSet<InterfaceIndex>,
    table: RoutingTable,
    timer: Option<EventId>,
    state: RoutingState,
    rounds: u64,
    received: u64,
    malformed: u64,
    send_failures: u64,
}

impl DvState {
    /// Neighbours reachable right now.
    fn live_neighbors(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter().filter(move |n| !self.down.contains(&n.egress))
    }

    /// Destinations answered by a direct neighbour route; never learned.
    fn is_pinned(&self, destination: Ipv4Addr) -> bool {
        self.live_neighbors().any(|n| n.address == destination)
    }

    fn install_direct(&mut self, egress: Option<InterfaceIndex>) {
        let direct: Vec<Neighbor> = self
            .live_neighbors()
            .filter(|n| egress.map_or(true, |e| n.egress == e))
            .copied()
            .collect();
        for n in direct {
            self.table.remove_destination(n.address);
            self.table
                .insert(Route::new(n.address, n.address, n.egress, n.cost));
        }
    }

    /// The table as `to` should see it.
    fn advertisement(&self, to: &Neighbor) -> Vec<Advert> {
        let own = self.local.iter().map(|&destination| Advert {
            destination,
            cost: 0.0,
        });
        let learned = self.table.routes().map(|r| Advert {
            destination: r.destination,
            cost: if r.egress_interface == to.egress {
                INFINITE_METRIC
            } else {
                r.cost
            },
        });
        own.chain(learned).collect()
    }

    /// Merge a full advertisement from `from`. Returns how many routes changed.
    fn learn(&mut self, now: VirtualTime, from: Ipv4Addr, adverts: &[Advert]) -> usize {
        let Some(neighbor) = self.live_neighbors().find(|n| n.address == from).copied() else {
            trace!(node = %self.node, %from, "advertisement from unknown or unreachable peer ignored");
            return 0;
        };
        self.received += 1;
        let mut changed = 0;

        let via_neighbor = |r: &Route| r.next_hop == from && r.egress_interface == neighbor.egress;

        // Whatever the neighbour stopped listing is gone.
        let withdrawn: Vec<Ipv4Addr> = self
            .table
            .routes()
            .filter(|r| via_neighbor(*r) && !self.is_pinned(r.destination))
            .filter(|r| !adverts.iter().any(|a| a.destination == r.destination))
            .map(|r| r.destination)
            .collect();
        for destination in withdrawn {
            changed += self.table.remove_destination(destination);
        }

        for advert in adverts {
            let destination = advert.destination;
            if advert.cost < 0.0 || self.local.contains(&destination) || self.is_pinned(destination) {
                continue;
            }
            let cost = (advert.cost + neighbor.cost).min(INFINITE_METRIC);
            let current = self
                .table
                .routes()
                .find(|r| r.destination == destination)
                .copied();
            let replace = match current {
                Some(r) if via_neighbor(&r) => cost != r.cost,
                Some(r) => cost < r.cost,
                None => cost < INFINITE_METRIC,
            };
            if !replace {
                continue;
            }
            self.table.remove_destination(destination);
            if cost < INFINITE_METRIC {
                self.table
                    .insert(Route::new(destination, from, neighbor.egress, cost));
            }
            changed += 1;
        }

        if changed > 0 {
            debug!(node = %self.node, %now, %from, changed, routes = self.table.len(), "routes learned");
        }
        changed
    }
}

/// Routing that learns next hops from periodic neighbour advertisements.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct DistanceVectorRouting {
    inner: Rc<RefCell<DvState>>,
}

impl DistanceVectorRouting {
    /// Create the module for `node` and bind its advertisement socket to
    /// `0.0.0.0:port`.
    pub fn new(
        network: &Network,
        node: NodeId,
        interval: SimDuration,
        port: u16,
    ) -> SimResult<Self> {
        let socket = UdpSocket::new(network, node)?;
        socket.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;

        let inner = Rc::new(RefCell::new(DvState {
            node,
            interval,
            port,
            network: network.downgrade(),
            socket: None,
            neighbors: Vec::new(),
            local: Vec::new(),
            down: BTreeSet::new(),
            table: RoutingTable::new(),
            timer: None,
            state: RoutingState::Uninitialized,
            rounds: 0,
            received: 0,
            malformed: 0,
            send_failures: 0,
        }));

        let weak: Weak<RefCell<DvState>> = Rc::downgrade(&inner);
        socket.set_receive_callback(move |sim: &mut Simulation, packet: Packet, from: SocketAddrV4| {
            let Some(shared) = weak.upgrade() else {
                return Ok(());
            };
            let mut state = shared.borrow_mut();
            match serde_json::from_slice::<Vec<Advert>>(packet.payload()) {
                Ok(adverts) => {
                    state.learn(sim.now(), *from.ip(), &adverts);
                }
                Err(err) => {
                    state.malformed += 1;
                    warn!(node = %state.node, %from, %err, "malformed advertisement dropped");
                }
            }
            Ok(())
        });
        inner.borrow_mut().socket = Some(socket);

        Ok(DistanceVectorRouting { inner })
    }

    /// Declare a directly connected neighbour reached through `egress`
    /// at link cost `cost`.
    pub fn add_neighbor(&self, address: Ipv4Addr, egress: InterfaceIndex, cost: f64) {
        let mut state = self.inner.borrow_mut();
        state.neighbors.retain(|n| n.address != address);
        state.neighbors.push(Neighbor {
            address,
            egress,
            cost,
        });
        if state.state == RoutingState::Active {
            state.install_direct(Some(egress));
        }
    }

    /// Builder form of [`add_neighbor`](Self::add_neighbor).
    pub fn with_neighbor(self, address: Ipv4Addr, egress: InterfaceIndex, cost: f64) -> Self {
        self.add_neighbor(address, egress, cost);
        self
    }

    pub fn interval(&self) -> SimDuration {
        self.inner.borrow().interval
    }

    pub fn port(&self) -> u16 {
        self.inner.borrow().port
    }

    /// Advertisement rounds sent so far.
    pub fn updates(&self) -> u64 {
        self.inner.borrow().rounds
    }

    /// Advertisements accepted from neighbours.
    pub fn received(&self) -> u64 {
        self.inner.borrow().received
    }

    /// Datagrams on the advertisement port that did not decode.
    pub fn malformed(&self) -> u64 {
        self.inner.borrow().malformed
    }

    /// Advertisements that could not be sent.
    pub fn send_failures(&self) -> u64 {
        self.inner.borrow().send_failures
    }

    /// The outstanding update event, if any.
    pub fn pending_update(&self) -> Option<EventId> {
        self.inner.borrow().timer
    }

    pub fn table(&self) -> RoutingTable {
        self.inner.borrow().table.clone()
    }

    /// What the next round would send to `neighbor`, or `None` if it is
    /// not a configured neighbour.
    pub fn advertisement_to(&self, neighbor: Ipv4Addr) -> Option<Vec<Advert>> {
        let state = self.inner.borrow();
        let to = state.neighbors.iter().find(|n| n.address == neighbor)?;
        Some(state.advertisement(to))
    }

    /// Schedule the next round. The event owns the socket.
    fn arm(
        shared: &Rc<RefCell<DvState>>,
        socket: UdpSocket,
        sim: &mut Simulation,
        delay: SimDuration,
    ) -> SimResult<()> {
        let weak: Weak<RefCell<DvState>> = Rc::downgrade(shared);
        let id = sim.schedule(delay, move |sim: &mut Simulation| {
            let Some(shared) = weak.upgrade() else {
                return Ok(());
            };
            let (outgoing, network) = {
                let mut state = shared.borrow_mut();
                state.timer = None;
                if state.state != RoutingState::Active {
                    return Ok(());
                }
                state.rounds += 1;
                let mut outgoing = Vec::new();
                for to in state.live_neighbors() {
                    let payload = serde_json::to_vec(&state.advertisement(to))
                        .map_err(|err| SimError::Application(err.to_string()))?;
                    outgoing.push((SocketAddrV4::new(to.address, state.port), payload));
                }
                (outgoing, state.network.upgrade())
            };
            let Some(network) = network else {
                return Ok(());
            };

            for (to, payload) in outgoing {
                let packet = Packet::new(network.next_packet_uid(), payload);
                match socket.send_to(sim, packet, to) {
                    Ok(()) => trace!(node = %socket.node(), %to, "advertisement sent"),
                    Err(err) if err.is_no_route() => {
                        shared.borrow_mut().send_failures += 1;
                        debug!(node = %socket.node(), %to, %err, "advertisement not sent");
                    }
                    Err(err) => return Err(err),
                }
            }

            let interval = {
                let state = shared.borrow();
                if state.state != RoutingState::Active || state.timer.is_some() {
                    return Ok(());
                }
                state.interval
            };
            Self::arm(&shared, socket, sim, interval)
        })?;
        shared.borrow_mut().timer = Some(id);
        Ok(())
    }
}

impl fmt::Debug for DistanceVectorRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("DistanceVectorRouting")
            .field("node", &state.node)
            .field("interval", &state.interval)
            .field("port", &state.port)
            .field("neighbors", &state.neighbors.len())
            .field("routes", &state.table.len())
            .field("state", &state.state)
            .field("rounds", &state.rounds)
            .finish()
    }
}

impl RoutingProtocol for DistanceVectorRouting {
    fn name(&self) -> &'static str {
        "distance-vector"
    }

    /// Installs the direct neighbour routes and schedules the first
    /// round for now. Never touches the network.
    fn attach(
        &mut self,
        node: NodeId,
        interfaces: &[Interface],
        sim: &mut Simulation,
    ) -> SimResult<()> {
        let socket = {
            let mut state = self.inner.borrow_mut();
            if node != state.node {
                return Err(SimError::InvalidConfig(format!(
                    "distance-vector routing built for {} cannot attach to {}",
                    state.node, node
                )));
            }
            if state.interval.is_negative() || state.interval.is_zero() {
                return Err(SimError::InvalidConfig(format!(
                    "routing update interval must be positive, got {}",
                    state.interval
                )));
            }
            if let Some(n) = state
                .neighbors
                .iter()
                .find(|n| interface::find(interfaces, n.egress).is_none())
            {
                return Err(SimError::InvalidRoute(format!(
                    "egress {} toward neighbour {} does not belong to node {}",
                    n.egress, n.address, node
                )));
            }
            if let Some(n) = state
                .neighbors
                .iter()
                .find(|n| !n.cost.is_finite() || n.cost <= 0.0 || n.cost >= INFINITE_METRIC)
            {
                return Err(SimError::InvalidConfig(format!(
                    "link cost {} toward {} must lie in (0, {})",
                    n.cost, n.address, INFINITE_METRIC
                )));
            }
            let Some(socket) = state.socket.take() else {
                return Err(SimError::InvalidConfig(
                    "distance-vector routing was already attached once".into(),
                ));
            };
            state.local = interfaces.iter().map(Interface::address).collect();
            state.down = interfaces
                .iter()
                .filter(|i| !i.is_up())
                .map(Interface::index)
                .collect();
            state.table.clear();
            state.install_direct(None);
            state.state = RoutingState::Active;
            info!(
                %node,
                interval = %state.interval,
                port = state.port,
                neighbors = state.neighbors.len(),
                "distance-vector routing attached"
            );
            socket
        };
        Self::arm(&self.inner, socket, sim, SimDuration::ZERO)
    }

    /// Cancelling the update event drops the socket with it.
    fn detach(&mut self, sim: &mut Simulation) {
        let timer = {
            let mut state = self.inner.borrow_mut();
            if state.state == RoutingState::Active {
                debug!(node = %state.node, "distance-vector routing detached");
            }
            state.state = RoutingState::Detached;
            state.socket = None;
            state.timer.take()
        };
        if let Some(timer) = timer {
            sim.cancel(timer);
        }
    }

    fn state(&self) -> RoutingState {
        self.inner.borrow().state
    }

    fn lookup(
        &self,
        destination: Ipv4Addr,
        hint: Option<InterfaceIndex>,
        interfaces: &[Interface],
    ) -> Option<Route> {
        self.inner.borrow().table.best(destination, hint, interfaces)
    }

    fn notify_interface_up(&mut self, index: InterfaceIndex) {
        let mut state = self.inner.borrow_mut();
        if state.down.remove(&index) {
            state.install_direct(Some(index));
            debug!(node = %state.node, interface = %index, "interface up, neighbour routes restored");
        }
    }

    fn notify_interface_down(&mut self, index: InterfaceIndex) {
        let mut state = self.inner.borrow_mut();
        state.down.insert(index);
        let purged = state.table.remove_via(index);
        if purged > 0 {
            warn!(node = %state.node, interface = %index, purged, "interface down, routes purged");
        }
    }

    fn routes(&self) -> Vec<Route> {
        self.inner.borrow().table.routes().copied().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Endpoint, LinkConfig};
    use testresult::TestResult;

    const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const FAR: Ipv4Addr = Ipv4Addr::new(10, 7, 0, 1);

    /// Two nodes on one link; distance-vector modules built but not attached.
    fn pair() -> SimResult<(Network, DistanceVectorRouting, DistanceVectorRouting)> {
        let net = Network::new(5);
        let a = net.add_node();
        let b = net.add_node();
        let ia = net.add_interface(a, A)?;
        let ib = net.add_interface(b, B)?;
        net.connect(
            Endpoint { node: a, interface: ia },
            Endpoint { node: b, interface: ib },
            LinkConfig::point_to_point(SimDuration::from_millis(1)),
        )?;
        let da = DistanceVectorRouting::new(&net, a, SimDuration::from_secs(1), DEFAULT_PORT)?
            .with_neighbor(B, ia, 1.0);
        let db = DistanceVectorRouting::new(&net, b, SimDuration::from_secs(1), DEFAULT_PORT)?
            .with_neighbor(A, ib, 1.0);
        Ok((net, da, db))
    }

    #[test]
    fn test_attach_installs_neighbours_and_arms_one_timer() -> TestResult {
        let mut sim = Simulation::new();
        let (net, da, _db) = pair()?;
        let a = NodeId::new(0);
        net.attach_routing(&mut sim, a, da.clone())?;

        assert_eq!(da.state(), RoutingState::Active);
        assert_eq!(da.routes(), vec![Route::new(B, B, InterfaceIndex::new(0), 1.0)]);
        assert_eq!(sim.pending_events(), 1);
        assert_eq!(sim.delay_left(da.pending_update().unwrap()), Some(SimDuration::ZERO));
        Ok(())
    }

    #[test]
    fn test_learns_from_neighbour_and_keeps_one_timer() -> TestResult {
        let mut sim = Simulation::new();
        let (net, da, db) = pair()?;
        net.attach_routing(&mut sim, NodeId::new(0), da.clone())?;
        net.attach_routing(&mut sim, NodeId::new(1), db.clone())?;

        sim.run(Some(VirtualTime::from_millis(2500)))?;

        // Rounds at 0s, 1s and 2s, each answered by the peer.
        assert_eq!(da.updates(), 3);
        assert_eq!(da.received(), 3);
        assert_eq!(db.received(), 3);
        assert_eq!(da.malformed(), 0);
        assert!(da.pending_update().is_some());
        // One update event per module; every advertisement already landed.
        assert_eq!(sim.pending_events(), 2);
        Ok(())
    }

    #[test]
    fn test_better_route_replaces_worse_one() {
        let mut state = standalone_state();
        let via_b = [Advert { destination: FAR, cost: 3.0 }];
        let via_c = [Advert { destination: FAR, cost: 1.0 }];

        assert_eq!(state.learn(VirtualTime::ZERO, B, &via_b), 1);
        let route = state.table.routes().find(|r| r.destination == FAR).copied().unwrap();
        assert_eq!((route.next_hop, route.cost), (B, 4.0));

        assert_eq!(state.learn(VirtualTime::ZERO, C, &via_c), 1);
        let route = state.table.routes().find(|r| r.destination == FAR).copied().unwrap();
        assert_eq!((route.next_hop, route.egress_interface, route.cost), (C, InterfaceIndex::new(1), 2.0));

        // A worse offer from another neighbour is ignored.
        assert_eq!(state.learn(VirtualTime::ZERO, B, &via_b), 0);
    }

    #[test]
    fn test_current_next_hop_can_worsen_or_withdraw() {
        let mut state = standalone_state();
        state.learn(VirtualTime::ZERO, B, &[Advert { destination: FAR, cost: 1.0 }]);

        state.learn(VirtualTime::ZERO, B, &[Advert { destination: FAR, cost: 5.0 }]);
        let route = state.table.routes().find(|r| r.destination == FAR).copied().unwrap();
        assert_eq!(route.cost, 6.0);

        state.learn(VirtualTime::ZERO, B, &[Advert { destination: FAR, cost: INFINITE_METRIC }]);
        assert!(state.table.routes().all(|r| r.destination != FAR));

        // Dropping a destination from the advertisement withdraws it too.
        state.learn(VirtualTime::ZERO, B, &[Advert { destination: FAR, cost: 1.0 }]);
        state.learn(VirtualTime::ZERO, B, &[]);
        assert!(state.table.routes().all(|r| r.destination != FAR));
        // The direct neighbour route is never withdrawn by an advertisement.
        assert!(state.table.routes().any(|r| r.destination == B));
    }

    #[test]
    fn test_poison_reverse_on_learning_interface() {
        let mut state = standalone_state();
        state.learn(VirtualTime::ZERO, B, &[Advert { destination: FAR, cost: 1.0 }]);

        let to_b = state.neighbors[0];
        let to_c = state.neighbors[1];
        let cost_of = |adverts: &[Advert], d: Ipv4Addr| {
            adverts.iter().find(|a| a.destination == d).map(|a| a.cost)
        };

        let back = state.advertisement(&to_b);
        assert_eq!(cost_of(&back[..], FAR), Some(INFINITE_METRIC));
        assert_eq!(cost_of(&back[..], A), Some(0.0));

        let onward = state.advertisement(&to_c);
        assert_eq!(cost_of(&onward[..], FAR), Some(2.0));
        assert_eq!(cost_of(&onward[..], B), Some(1.0));
    }

    #[test]
    fn test_unknown_peer_is_ignored() {
        let mut state = standalone_state();
        let stranger = Ipv4Addr::new(192, 168, 1, 1);
        assert_eq!(state.learn(VirtualTime::ZERO, stranger, &[Advert { destination: FAR, cost: 1.0 }]), 0);
        assert_eq!(state.received, 0);
    }

    #[test]
    fn test_malformed_advertisement_counted() -> TestResult {
        let mut sim = Simulation::new();
        let (net, da, _db) = pair()?;
        net.attach_routing(&mut sim, NodeId::new(0), da.clone())?;

        // Looped back on A itself, so no route is needed.
        let junk = UdpSocket::new(&net, NodeId::new(0))?;
        junk.send_to(&mut sim, Packet::new(99, &b"not json"[..]), SocketAddrV4::new(A, DEFAULT_PORT))?;
        sim.run(Some(VirtualTime::from_millis(10)))?;

        assert_eq!(da.malformed(), 1);
        assert_eq!(da.received(), 0);
        Ok(())
    }

    #[test]
    fn test_detach_cancels_timer_and_releases_port() -> TestResult {
        let mut sim = Simulation::new();
        let (net, da, _db) = pair()?;
        let a = NodeId::new(0);
        net.attach_routing(&mut sim, a, da.clone())?;
        let timer = da.pending_update().unwrap();

        net.detach_routing(&mut sim, a)?;

        assert_eq!(da.state(), RoutingState::Detached);
        assert!(!sim.is_pending(timer));
        assert!(da.pending_update().is_none());
        assert_eq!(sim.run(None)?, 0);
        assert_eq!(da.updates(), 0);
        // Still answers from the last state.
        assert!(net.route_output(a, B, None).is_ok());
        // The advertisement port is free again.
        UdpSocket::new(&net, a)?.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))?;
        Ok(())
    }

    #[test]
    fn test_attach_rejects_bad_configuration() -> TestResult {
        let mut sim = Simulation::new();
        let (net, _da, _db) = pair()?;
        let a = NodeId::new(0);
        let b = NodeId::new(1);

        // Built for another node.
        let wrong = DistanceVectorRouting::new(&net, b, SimDuration::from_secs(1), 600)?;
        assert!(matches!(net.attach_routing(&mut sim, a, wrong), Err(SimError::InvalidConfig(_))));

        let zero = DistanceVectorRouting::new(&net, a, SimDuration::ZERO, 601)?;
        assert!(matches!(net.attach_routing(&mut sim, a, zero), Err(SimError::InvalidConfig(_))));

        let far_egress = DistanceVectorRouting::new(&net, a, SimDuration::from_secs(1), 602)?
            .with_neighbor(B, InterfaceIndex::new(4), 1.0);
        assert!(matches!(net.attach_routing(&mut sim, a, far_egress), Err(SimError::InvalidRoute(_))));

        let unreachable = DistanceVectorRouting::new(&net, a, SimDuration::from_secs(1), 603)?
            .with_neighbor(B, InterfaceIndex::new(0), INFINITE_METRIC);
        assert!(matches!(net.attach_routing(&mut sim, a, unreachable), Err(SimError::InvalidConfig(_))));

        assert_eq!(sim.pending_events(), 0);
        assert_eq!(net.routing_name(a)?, None);
        Ok(())
    }

    const C: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);

    /// Detached state for node A with neighbours B (if0) and C (if1), both at cost 1.
    fn standalone_state() -> DvState {
        let mut state = DvState {
            node: NodeId::new(0),
            interval: SimDuration::from_secs(1),
            port: DEFAULT_PORT,
            network: Network::new(0).downgrade(),
            socket: None,
            neighbors: vec![
                Neighbor { address: B, egress: InterfaceIndex::new(0), cost: 1.0 },
                Neighbor { address: C, egress: InterfaceIndex::new(1), cost: 1.0 },
            ],
            local: vec![A, Ipv4Addr::new(10, 0, 1, 1)],
            down: BTreeSet::new(),
            table: RoutingTable::new(),
            timer: None,
            state: RoutingState::Active,
            rounds: 0,
            received: 0,
            malformed: 0,
            send_failures: 0,
        };
        state.install_direct(None);
        state
    }
}
