//! The forwarding layer.
//!
//! A [`Network`] owns every node, its interfaces and routing module, the
//! links between interfaces and the UDP port table. Packets move between
//! nodes only through scheduled events:
//!
//! ```text
//! socket ──send──▶ route_output ──▶ link ──(delay)──▶ receive ──▶ route_input
//!                                                                  │
//!                          ┌──────────── forward (TTL−1) ◀─────────┤
//!                          ▼                                       ▼
//!                        link                           deliver_local ──▶ socket
//! ```
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`link`] | [`Link`], [`LinkConfig`], [`LinkDecision`] |
//! | [`stats`] | [`NetworkStats`], [`DropReason`] |
//!
//! `Network` is a cheap handle (`Rc<RefCell<..>>`); clones share state.
//! Routing modules are invoked while the network is borrowed, so they
//! must never call back into the `Network` handle.

pub mod link;
pub mod stats;


pub use link::{Endpoint, Link, LinkConfig, LinkDecision, LinkId};
pub use stats::{DropReason, NetworkStats};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::ops::Range;
use std::rc::{Rc, Weak};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace};

use crate::error::{NoRouteError, SimError, SimResult};
use crate::node::{AdminState, Interface, InterfaceIndex, Node, NodeId};
use crate::packet::{Ipv4Header, Packet};
use crate::routing::{
    Disposition, DispositionRecorder, InputHandler, Route, RoutingProtocol, RoutingTable,
};
use crate::simulation::Simulation;
use crate::socket::{self, SocketInner};

/// Range of ephemeral ports handed to sockets bound to port 0.
const EPHEMERAL_PORT_RANGE: Range<u16> = 32768..61000;

type SocketSlot = Weak<RefCell<SocketInner>>;

// ── NetworkInner ──────────────────────────────────────────────────────

struct NetworkInner {
    nodes: Vec<Node>,
    links: Vec<Link>,
    rng: StdRng,
    stats: NetworkStats,
    sockets: BTreeMap<(NodeId, SocketAddrV4), SocketSlot>,
    ephemeral: BTreeMap<NodeId, u16>,
    next_uid: u64,
}

impl NetworkInner {
    fn node(&self, id: NodeId) -> SimResult<&Node> {
        self.nodes
            .get(id.raw() as usize)
            .ok_or(SimError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> SimResult<&mut Node> {
        self.nodes
            .get_mut(id.raw() as usize)
            .ok_or(SimError::NodeNotFound(id))
    }

    fn interface(&self, node: NodeId, index: InterfaceIndex) -> SimResult<&Interface> {
        self.node(node)?
            .interface(index)
            .ok_or(SimError::InterfaceNotFound {
                node,
                interface: index,
            })
    }

    fn drop_packet(&mut self, node: NodeId, packet: &Packet, reason: DropReason) {
        self.stats.record_drop(reason);
        debug!(%node, uid = packet.uid(), %reason, "packet dropped");
    }

    fn is_port_free(&self, node: NodeId, address: SocketAddrV4) -> bool {
        self.sockets
            .get(&(node, address))
            .map_or(true, |slot| slot.strong_count() == 0)
    }

    fn allocate_port(&mut self, node: NodeId, ip: Ipv4Addr) -> SimResult<u16> {
        let span = EPHEMERAL_PORT_RANGE.end - EPHEMERAL_PORT_RANGE.start;
        let start = *self
            .ephemeral
            .get(&node)
            .unwrap_or(&EPHEMERAL_PORT_RANGE.start);
        for offset in 0..span {
            let port = EPHEMERAL_PORT_RANGE.start
                + (start - EPHEMERAL_PORT_RANGE.start + offset) % span;
            if self.is_port_free(node, SocketAddrV4::new(ip, port)) {
                let next = if port + 1 >= EPHEMERAL_PORT_RANGE.end {
                    EPHEMERAL_PORT_RANGE.start
                } else {
                    port + 1
                };
                self.ephemeral.insert(node, next);
                return Ok(port);
            }
        }
        Err(SimError::PortExhausted(node))
    }

    /// Put `packet` on the link attached to `egress`.
    fn transmit(
        &mut self,
        sim: &mut Simulation,
        network: WeakNetwork,
        node: NodeId,
        egress: InterfaceIndex,
        packet: Packet,
    ) -> SimResult<()> {
        let iface = self.interface(node, egress)?;
        if !iface.is_up() {
            self.drop_packet(node, &packet, DropReason::InterfaceDown);
            return Ok(());
        }
        let Some(link_id) = iface.link() else {
            self.drop_packet(node, &packet, DropReason::NoLink);
            return Ok(());
        };

        let from = Endpoint {
            node,
            interface: egress,
        };
        let Some(link) = self.links.get_mut(link_id.raw() as usize) else {
            self.drop_packet(node, &packet, DropReason::NoLink);
            return Ok(());
        };
        let Some(to) = link.peer_of(from) else {
            self.drop_packet(node, &packet, DropReason::NoLink);
            return Ok(());
        };

        match link.process(&mut self.rng) {
            LinkDecision::DroppedByChance => {
                self.drop_packet(node, &packet, DropReason::LinkLoss);
                Ok(())
            }
            LinkDecision::Delivered { latency } => {
                self.stats.transmitted += 1;
                trace!(uid = packet.uid(), %from, %to, %latency, "packet transmitted");
                sim.schedule(latency, move |sim: &mut Simulation| {
                    match network.upgrade() {
                        Some(network) => network.receive(sim, to.node, to.interface, packet),
                        None => Ok(()),
                    }
                })?;
                Ok(())
            }
        }
    }
}

// ── Network ───────────────────────────────────────────────────────────

/// Handle to the simulated network.
#[derive(Clone)]
pub struct Network {
    inner: Rc<RefCell<NetworkInner>>,
}

/// Non-owning handle held by scheduled deliveries.
#[derive(Clone)]
pub struct WeakNetwork {
    inner: Weak<RefCell<NetworkInner>>,
}

impl WeakNetwork {
    pub fn upgrade(&self) -> Option<Network> {
        self.inner.upgrade().map(|inner| Network { inner })
    }
}

impl Network {
    /// Create an empty network whose link randomness derives from `seed`.
    pub fn new(seed: u64) -> Self {
        Network {
            inner: Rc::new(RefCell::new(NetworkInner {
                nodes: Vec::new(),
                links: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
                stats: NetworkStats::default(),
                sockets: BTreeMap::new(),
                ephemeral: BTreeMap::new(),
                next_uid: 0,
            })),
        }
    }

    pub fn downgrade(&self) -> WeakNetwork {
        WeakNetwork {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ── Topology ──────────────────────────────────────────────────

    pub fn add_node(&self) -> NodeId {
        let mut inner = self.inner.borrow_mut();
        let id = NodeId::new(inner.nodes.len() as u32);
        inner.nodes.push(Node::new(id));
        debug!(node = %id, "node created");
        id
    }

    /// Add an interface with `address` to `node`. Addresses are unique
    /// across the network.
    pub fn add_interface(&self, node: NodeId, address: Ipv4Addr) -> SimResult<InterfaceIndex> {
        let mut inner = self.inner.borrow_mut();
        if address.is_unspecified() || address.is_broadcast() {
            return Err(SimError::InvalidConfig(format!(
                "{} cannot be assigned to an interface",
                address
            )));
        }
        if inner.nodes.iter().any(|n| n.owns_address(address)) {
            return Err(SimError::InvalidConfig(format!(
                "address {} is already assigned",
                address
            )));
        }
        let index = inner.node_mut(node)?.add_interface(address);
        debug!(%node, interface = %index, %address, "interface added");
        Ok(index)
    }

    /// Join two interfaces with a link.
    pub fn connect(&self, a: Endpoint, b: Endpoint, config: LinkConfig) -> SimResult<LinkId> {
        config.validate()?;
        let mut inner = self.inner.borrow_mut();
        for end in [a, b] {
            if inner.interface(end.node, end.interface)?.link().is_some() {
                return Err(SimError::InterfaceInUse {
                    node: end.node,
                    interface: end.interface,
                });
            }
        }
        if a == b {
            return Err(SimError::InterfaceInUse {
                node: a.node,
                interface: a.interface,
            });
        }

        let id = LinkId::new(inner.links.len() as u32);
        inner.links.push(Link::new(id, a, b, config));
        for end in [a, b] {
            if let Some(iface) = inner.node_mut(end.node)?.interface_mut(end.interface) {
                iface.link = Some(id);
            }
        }
        debug!(link = %id, %a, %b, delay = %config.delay, "link connected");
        Ok(id)
    }

    /// Change an interface's administrative state and notify the node's
    /// routing module. Setting the current state again is a no-op.
    pub fn set_interface_state(
        &self,
        node: NodeId,
        index: InterfaceIndex,
        state: AdminState,
    ) -> SimResult<()> {
        let mut inner = self.inner.borrow_mut();
        let n = inner.node_mut(node)?;
        let Node {
            interfaces,
            routing,
            ..
        } = n;
        let iface = interfaces
            .get_mut(index.raw() as usize)
            .ok_or(SimError::InterfaceNotFound {
                node,
                interface: index,
            })?;
        if iface.state == state {
            return Ok(());
        }
        iface.state = state;
        info!(%node, interface = %index, ?state, "interface state changed");

        if let Some(routing) = routing.as_mut() {
            match state {
                AdminState::Up => routing.notify_interface_up(index),
                AdminState::Down => routing.notify_interface_down(index),
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn interface(&self, node: NodeId, index: InterfaceIndex) -> SimResult<Interface> {
        self.inner.borrow().interface(node, index).cloned()
    }

    pub fn interfaces(&self, node: NodeId) -> SimResult<Vec<Interface>> {
        Ok(self.inner.borrow().node(node)?.interfaces().to_vec())
    }

    pub fn link(&self, id: LinkId) -> Option<Link> {
        self.inner.borrow().links.get(id.raw() as usize).cloned()
    }

    // ── Routing ───────────────────────────────────────────────────

    /// Attach a routing module to `node`. One module per node.
    pub fn attach_routing(
        &self,
        sim: &mut Simulation,
        node: NodeId,
        protocol: impl RoutingProtocol + 'static,
    ) -> SimResult<()> {
        let mut inner = self.inner.borrow_mut();
        let n = inner.node_mut(node)?;
        if n.routing.is_some() {
            return Err(SimError::RoutingAlreadyAttached(node));
        }
        let mut protocol: Box<dyn RoutingProtocol> = Box::new(protocol);
        protocol.attach(node, &n.interfaces, sim)?;
        info!(%node, protocol = protocol.name(), "routing attached");
        n.routing = Some(protocol);
        Ok(())
    }

    /// Detach the routing module of `node`. It stays installed and keeps
    /// answering lookups from its last state.
    pub fn detach_routing(&self, sim: &mut Simulation, node: NodeId) -> SimResult<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(routing) = inner.node_mut(node)?.routing.as_mut() {
            routing.detach(sim);
            info!(%node, protocol = routing.name(), "routing detached");
        }
        Ok(())
    }

    /// Run `f` against the concrete routing module of `node`.
    pub fn with_routing<T, R>(
        &self,
        node: NodeId,
        f: impl FnOnce(&mut T, &[Interface]) -> R,
    ) -> SimResult<R>
    where
        T: RoutingProtocol + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let Node {
            interfaces,
            routing,
            ..
        } = inner.node_mut(node)?;
        let concrete = routing
            .as_mut()
            .and_then(|r| r.as_any_mut().downcast_mut::<T>())
            .ok_or(SimError::RoutingTypeMismatch {
                node,
                expected: std::any::type_name::<T>(),
            })?;
        Ok(f(concrete, interfaces))
    }

    /// Best route from `node` toward `destination`.
    pub fn route_output(
        &self,
        node: NodeId,
        destination: Ipv4Addr,
        hint: Option<InterfaceIndex>,
    ) -> SimResult<Route> {
        let inner = self.inner.borrow();
        let n = inner.node(node)?;
        let routing = n
            .routing
            .as_ref()
            .ok_or(NoRouteError::new(destination))?;
        let header = Ipv4Header::udp(Ipv4Addr::UNSPECIFIED, destination);
        let empty = Packet::zeroed(0, 0);
        Ok(routing.route_output(&empty, &header, hint, n.interfaces())?)
    }

    /// Snapshot of the routes installed on `node`.
    pub fn routes(&self, node: NodeId) -> SimResult<Vec<Route>> {
        let inner = self.inner.borrow();
        Ok(inner
            .node(node)?
            .routing
            .as_ref()
            .map(|r| r.routes())
            .unwrap_or_default())
    }

    /// The routes of `node` as a printable table.
    pub fn routing_table(&self, node: NodeId) -> SimResult<RoutingTable> {
        let mut table = RoutingTable::new();
        for route in self.routes(node)? {
            table.insert(route);
        }
        Ok(table)
    }

    pub fn routing_name(&self, node: NodeId) -> SimResult<Option<&'static str>> {
        Ok(self.inner.borrow().node(node)?.routing_name())
    }

    // ── Packets ───────────────────────────────────────────────────

    pub fn stats(&self) -> NetworkStats {
        self.inner.borrow().stats.clone()
    }

    /// A fresh, network-wide unique packet uid.
    pub fn next_packet_uid(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.next_uid += 1;
        inner.next_uid
    }

    /// Originate `packet` at `node`, toward `destination`.
    ///
    /// Pushes the IPv4 header. An unspecified `source` is replaced by the
    /// egress interface address. Packets addressed to the node itself are
    /// looped back without consulting routing. Returns
    /// [`SimError::NoRoute`] when the routing module finds no path.
    pub fn send(
        &self,
        sim: &mut Simulation,
        node: NodeId,
        mut packet: Packet,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        hint: Option<InterfaceIndex>,
    ) -> SimResult<()> {
        let mut inner = self.inner.borrow_mut();
        let n = inner.node(node)?;

        if n.owns_address(destination) {
            let source = if source.is_unspecified() {
                destination
            } else {
                source
            };
            packet.push_header(Ipv4Header::udp(source, destination));
            trace!(%node, uid = packet.uid(), "packet looped back");
            let network = self.downgrade();
            sim.schedule_now(move |sim: &mut Simulation| match network.upgrade() {
                Some(network) => network.deliver_local(sim, node, packet),
                None => Ok(()),
            })?;
            return Ok(());
        }

        let mut header = Ipv4Header::udp(source, destination);
        let outcome = match n.routing.as_ref() {
            Some(routing) => routing.route_output(&packet, &header, hint, n.interfaces()),
            None => Err(NoRouteError::new(destination)),
        };
        let route = match outcome {
            Ok(route) => route,
            Err(err) => {
                inner.drop_packet(node, &packet, DropReason::NoRoute);
                return Err(err.into());
            }
        };

        if header.source.is_unspecified() {
            header.source = inner.interface(node, route.egress_interface)?.address();
        }
        packet.push_header(header);
        trace!(%node, uid = packet.uid(), %route, "packet sent");
        inner.transmit(sim, self.downgrade(), node, route.egress_interface, packet)
    }

    /// Handle a packet arriving on `ingress` of `node`.
    pub(crate) fn receive(
        &self,
        sim: &mut Simulation,
        node: NodeId,
        ingress: InterfaceIndex,
        packet: Packet,
    ) -> SimResult<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.interface(node, ingress)?.is_up() {
            inner.drop_packet(node, &packet, DropReason::InterfaceDown);
            return Ok(());
        }
        let Some(header) = packet.ipv4().copied() else {
            inner.drop_packet(node, &packet, DropReason::Malformed);
            return Ok(());
        };

        let n = inner.node(node)?;
        let mut recorder = DispositionRecorder::new();
        match n.routing.as_ref() {
            Some(routing) => {
                routing.route_input(packet, &header, ingress, n.interfaces(), &mut recorder);
            }
            None if n.owns_address(header.destination) => {
                recorder.deliver_locally(packet, &header, ingress)
            }
            None => recorder.error(packet, &header, NoRouteError::new(header.destination)),
        }

        match recorder.into_decision() {
            Some(Disposition::Local { packet, .. }) => {
                drop(inner);
                self.deliver_local(sim, node, packet)
            }
            Some(Disposition::Forward { mut packet, route }) => {
                let rejected = match packet.ipv4_mut() {
                    Some(ip) if ip.ttl > 1 => {
                        ip.ttl -= 1;
                        None
                    }
                    Some(_) => Some(DropReason::TtlExpired),
                    None => Some(DropReason::Malformed),
                };
                if let Some(reason) = rejected {
                    inner.drop_packet(node, &packet, reason);
                    return Ok(());
                }
                inner.stats.forwarded += 1;
                trace!(%node, uid = packet.uid(), %route, "packet forwarded");
                inner.transmit(sim, self.downgrade(), node, route.egress_interface, packet)
            }
            Some(Disposition::Error { packet, error }) => {
                debug!(%node, uid = packet.uid(), %error, "transit packet unroutable");
                inner.drop_packet(node, &packet, DropReason::NoRoute);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Strip IPv4 and UDP headers and hand the packet to the bound socket.
    fn deliver_local(&self, sim: &mut Simulation, node: NodeId, mut packet: Packet) -> SimResult<()> {
        let mut inner = self.inner.borrow_mut();
        let (Some(ip), Some(udp)) = (packet.pop_ipv4(), packet.pop_udp()) else {
            inner.drop_packet(node, &packet, DropReason::Malformed);
            return Ok(());
        };

        let exact = SocketAddrV4::new(ip.destination, udp.destination_port);
        let wildcard = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, udp.destination_port);
        let target = [exact, wildcard]
            .iter()
            .find_map(|addr| inner.sockets.get(&(node, *addr)).and_then(Weak::upgrade));
        let Some(target) = target else {
            inner.drop_packet(node, &packet, DropReason::NoSocket);
            return Ok(());
        };
        inner.stats.delivered += 1;
        drop(inner);

        let from = SocketAddrV4::new(ip.source, udp.source_port);
        socket::deliver_datagram(&target, sim, packet, from)
    }

    // ── Port table ────────────────────────────────────────────────

    /// Register a socket under `address` on `node`. Port 0 picks an
    /// ephemeral port. Returns the address actually bound.
    pub(crate) fn bind_socket(
        &self,
        node: NodeId,
        address: SocketAddrV4,
        slot: SocketSlot,
    ) -> SimResult<SocketAddrV4> {
        let mut inner = self.inner.borrow_mut();
        let ip = *address.ip();
        if !ip.is_unspecified() && !inner.node(node)?.owns_address(ip) {
            return Err(SimError::AddressNotAvailable { node, address: ip });
        }

        let port = match address.port() {
            0 => inner.allocate_port(node, ip)?,
            port => port,
        };
        let bound = SocketAddrV4::new(ip, port);
        if !inner.is_port_free(node, bound) {
            return Err(SimError::AddressInUse(bound));
        }
        inner.sockets.insert((node, bound), slot);
        debug!(%node, address = %bound, "socket bound");
        Ok(bound)
    }

    pub(crate) fn unbind_socket(&self, node: NodeId, address: SocketAddrV4) {
        if self.inner.borrow_mut().sockets.remove(&(node, address)).is_some() {
            debug!(%node, %address, "socket unbound");
        }
    }

    pub(crate) fn check_interface(&self, node: NodeId, index: InterfaceIndex) -> SimResult<()> {
        self.inner.borrow().interface(node, index).map(|_| ())
    }

    pub(crate) fn check_node(&self, node: NodeId) -> SimResult<()> {
        self.inner.borrow().node(node).map(|_| ())
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Network")
            .field("nodes", &inner.nodes.len())
            .field("links", &inner.links.len())
            .field("sockets", &inner.sockets.len())
            .field("stats", &inner.stats)
            .finish()
    }
}
