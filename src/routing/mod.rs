//! Routing decision modules.
//!
//! A [`RoutingProtocol`] is attached to a node and consulted by the
//! forwarding layer for every packet: `route_output` for packets the node
//! originates, `route_input` for packets arriving on one of its
//! interfaces.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`table`] | [`RoutingTable`] with deterministic best-route selection |
//! | [`static_routing`] | [`StaticRouting`], routes installed by topology code |
//! | [`cost`] | [`CostBasedRouting`], periodically recomputed costs via a [`CostMetric`] |
//! | [`distance_vector`] | [`DistanceVectorRouting`], next hops learned from neighbour advertisements |

pub mod cost;
pub mod distance_vector;
pub mod static_routing;
pub mod table;

pub use cost::{
    CostBasedRouting, CostInput, CostMetric, InterfaceWeights, PoissonCost, UniformCost,
};
pub use distance_vector::{Advert, DistanceVectorRouting, INFINITE_METRIC};
pub use static_routing::StaticRouting;
pub use table::RoutingTable;

use std::any::Any;
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{NoRouteError, SimResult};
use crate::node::{interface, Interface, InterfaceIndex, NodeId};
use crate::packet::{Ipv4Header, Packet};
use crate::simulation::Simulation;

// ── Route ─────────────────────────────────────────────────────────────

/// How to reach one destination: a value type, never shared across nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub destination: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub egress_interface: InterfaceIndex,
    pub cost: f64,
}

impl Route {
    pub fn new(
        destination: Ipv4Addr,
        next_hop: Ipv4Addr,
        egress_interface: InterfaceIndex,
        cost: f64,
    ) -> Self {
        Route {
            destination,
            next_hop,
            egress_interface,
            cost,
        }
    }

    /// Returns `true` if the egress interface exists in `interfaces` and is up.
    pub fn is_usable(&self, interfaces: &[Interface]) -> bool {
        interface::find(interfaces, self.egress_interface).is_some_and(Interface::is_up)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} dev {} cost {:.4}",
            self.destination, self.next_hop, self.egress_interface, self.cost
        )
    }
}

// ── RoutingState ──────────────────────────────────────────────────────

/// Lifecycle of a routing module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingState {
    /// Not yet attached to a node.
    Uninitialized,
    /// Attached; periodic work (if any) is scheduled.
    Active,
    /// Timer cancelled. Lookups are still answered from the last state.
    Detached,
}

// ── InputHandler ──────────────────────────────────────────────────────

/// The three continuations of `route_input`. Exactly one is invoked per
/// packet.
pub trait InputHandler {
    /// The packet is addressed to this node.
    fn deliver_locally(&mut self, packet: Packet, header: &Ipv4Header, ingress: InterfaceIndex);

    /// The packet should leave through `route`.
    fn forward(&mut self, packet: Packet, header: &Ipv4Header, route: Route);

    /// No route exists; the caller decides whether to drop or retry.
    fn error(&mut self, packet: Packet, header: &Ipv4Header, error: NoRouteError);
}

/// Outcome captured by [`DispositionRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Local {
        packet: Packet,
        ingress: InterfaceIndex,
    },
    Forward {
        packet: Packet,
        route: Route,
    },
    Error {
        packet: Packet,
        error: NoRouteError,
    },
}

/// An [`InputHandler`] that records the decision for the caller to act
/// on once it no longer borrows the node.
#[derive(Debug, Default)]
pub struct DispositionRecorder {
    decision: Option<Disposition>,
    calls: usize,
}

impl DispositionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of continuations invoked; a correct protocol makes this 1.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn into_decision(self) -> Option<Disposition> {
        self.decision
    }

    fn record(&mut self, decision: Disposition) {
        self.calls += 1;
        self.decision = Some(decision);
    }
}

impl InputHandler for DispositionRecorder {
    fn deliver_locally(&mut self, packet: Packet, _header: &Ipv4Header, ingress: InterfaceIndex) {
        self.record(Disposition::Local { packet, ingress });
    }

    fn forward(&mut self, packet: Packet, _header: &Ipv4Header, route: Route) {
        self.record(Disposition::Forward { packet, route });
    }

    fn error(&mut self, packet: Packet, _header: &Ipv4Header, error: NoRouteError) {
        self.record(Disposition::Error { packet, error });
    }
}

// ── RoutingProtocol ───────────────────────────────────────────────────

/// Per-node pluggable routing policy.
///
/// Implementors provide `lookup`; the provided `route_output` and
/// `route_input` build the full decision procedure on top of it and
/// guarantee that no route through a missing or down interface escapes.
///
/// Implementations **must**:
/// - Route all timers through the `Simulation` handed to `attach`.
/// - Hold at most one outstanding periodic event and cancel it in `detach`.
/// - Choose deterministically among equal-cost routes.
pub trait RoutingProtocol {
    /// Short protocol name for logs and table dumps.
    fn name(&self) -> &'static str;

    /// Attach to `node`. Periodic variants schedule their first update here.
    fn attach(
        &mut self,
        node: NodeId,
        interfaces: &[Interface],
        sim: &mut Simulation,
    ) -> SimResult<()>;

    /// Cancel pending work. Lookups keep answering from the last state.
    fn detach(&mut self, sim: &mut Simulation);

    fn state(&self) -> RoutingState;

    /// Best usable route toward `destination`, optionally restricted to
    /// leave through `hint`.
    fn lookup(
        &self,
        destination: Ipv4Addr,
        hint: Option<InterfaceIndex>,
        interfaces: &[Interface],
    ) -> Option<Route>;

    /// Route a locally originated packet.
    fn route_output(
        &self,
        _packet: &Packet,
        header: &Ipv4Header,
        hint: Option<InterfaceIndex>,
        interfaces: &[Interface],
    ) -> Result<Route, NoRouteError> {
        self.lookup(header.destination, hint, interfaces)
            .filter(|route| route.is_usable(interfaces))
            .ok_or(NoRouteError::new(header.destination))
    }

    /// Decide what to do with a packet that arrived on `ingress`.
    ///
    /// Invokes exactly one continuation of `handler`. Returns `false` only
    /// when the error continuation was taken.
    fn route_input(
        &self,
        packet: Packet,
        header: &Ipv4Header,
        ingress: InterfaceIndex,
        interfaces: &[Interface],
        handler: &mut dyn InputHandler,
    ) -> bool {
        if interface::owns_address(interfaces, header.destination) {
            handler.deliver_locally(packet, header, ingress);
            return true;
        }
        match self.route_output(&packet, header, None, interfaces) {
            Ok(route) => {
                handler.forward(packet, header, route);
                true
            }
            Err(error) => {
                handler.error(packet, header, error);
                false
            }
        }
    }

    /// Interface `index` came back up.
    fn notify_interface_up(&mut self, _index: InterfaceIndex) {}

    /// Interface `index` went down.
    fn notify_interface_down(&mut self, _index: InterfaceIndex) {}

    /// Snapshot of every installed route.
    fn routes(&self) -> Vec<Route>;

    /// Downcast support for [`Network::with_routing`](crate::network::Network::with_routing).
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::packet::Ipv4Header;

    /// Always answers with a fixed route, even through a down interface.
    struct Careless(Route);

    impl RoutingProtocol for Careless {
        fn name(&self) -> &'static str {
            "careless"
        }
        fn attach(&mut self, _: NodeId, _: &[Interface], _: &mut Simulation) -> SimResult<()> {
            Ok(())
        }
        fn detach(&mut self, _: &mut Simulation) {}
        fn state(&self) -> RoutingState {
            RoutingState::Active
        }
        fn lookup(&self, _: Ipv4Addr, _: Option<InterfaceIndex>, _: &[Interface]) -> Option<Route> {
            Some(self.0)
        }
        fn routes(&self) -> Vec<Route> {
            vec![self.0]
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn two_interface_node() -> Node {
        let mut node = Node::new(NodeId::new(0));
        node.add_interface(Ipv4Addr::new(10, 0, 0, 1));
        node.add_interface(Ipv4Addr::new(10, 0, 1, 1));
        node
    }

    #[test]
    fn test_route_output_never_returns_down_interface() {
        let mut node = two_interface_node();
        let dst = Ipv4Addr::new(10, 9, 9, 9);
        let proto = Careless(Route::new(dst, dst, InterfaceIndex::new(0), 1.0));
        let header = Ipv4Header::udp(Ipv4Addr::new(10, 0, 0, 1), dst);
        let packet = Packet::zeroed(1, 0);

        assert!(proto.route_output(&packet, &header, None, node.interfaces()).is_ok());

        node.interface_mut(InterfaceIndex::new(0)).unwrap().state = crate::node::AdminState::Down;
        let err = proto
            .route_output(&packet, &header, None, node.interfaces())
            .unwrap_err();
        assert_eq!(err.destination, dst);
    }

    #[test]
    fn test_route_input_local_delivery() {
        let node = two_interface_node();
        let dst = Ipv4Addr::new(10, 0, 1, 1);
        let proto = Careless(Route::new(dst, dst, InterfaceIndex::new(0), 1.0));
        let header = Ipv4Header::udp(Ipv4Addr::new(10, 0, 0, 2), dst);

        let mut recorder = DispositionRecorder::new();
        let handled = proto.route_input(
            Packet::zeroed(1, 0),
            &header,
            InterfaceIndex::new(0),
            node.interfaces(),
            &mut recorder,
        );

        assert!(handled);
        assert_eq!(recorder.calls(), 1);
        assert!(matches!(
            recorder.into_decision(),
            Some(Disposition::Local { ingress, .. }) if ingress == InterfaceIndex::new(0)
        ));
    }

    #[test]
    fn test_route_input_forwards_transit_packet() {
        let node = two_interface_node();
        let dst = Ipv4Addr::new(10, 9, 9, 9);
        let route = Route::new(dst, Ipv4Addr::new(10, 0, 1, 2), InterfaceIndex::new(1), 1.0);
        let proto = Careless(route);
        let header = Ipv4Header::udp(Ipv4Addr::new(10, 0, 0, 2), dst);

        let mut recorder = DispositionRecorder::new();
        let handled = proto.route_input(
            Packet::zeroed(4, 0),
            &header,
            InterfaceIndex::new(0),
            node.interfaces(),
            &mut recorder,
        );

        assert!(handled);
        assert_eq!(recorder.calls(), 1);
        match recorder.into_decision() {
            Some(Disposition::Forward { packet, route: chosen }) => {
                assert_eq!(packet.uid(), 4);
                assert_eq!(chosen, route);
            }
            other => panic!("expected a forward, got {:?}", other),
        }
    }

    #[test]
    fn test_route_input_without_route_takes_error_path() {
        let mut node = two_interface_node();
        let dst = Ipv4Addr::new(10, 9, 9, 9);
        // The only route leaves through a down interface.
        let proto = Careless(Route::new(dst, dst, InterfaceIndex::new(1), 1.0));
        node.interface_mut(InterfaceIndex::new(1)).unwrap().state = crate::node::AdminState::Down;
        let header = Ipv4Header::udp(Ipv4Addr::new(10, 0, 0, 2), dst);

        let mut recorder = DispositionRecorder::new();
        let handled = proto.route_input(
            Packet::zeroed(5, 0),
            &header,
            InterfaceIndex::new(0),
            node.interfaces(),
            &mut recorder,
        );

        assert!(!handled);
        assert_eq!(recorder.calls(), 1);
        match recorder.into_decision() {
            Some(Disposition::Error { packet, error }) => {
                assert_eq!(packet.uid(), 5);
                assert_eq!(error, NoRouteError::new(dst));
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn test_route_display() {
        let r = Route::new(
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 1, 2),
            InterfaceIndex::new(1),
            0.5,
        );
        assert_eq!(r.to_string(), "10.0.0.2 via 10.0.1.2 dev if1 cost 0.5000");
    }
}
