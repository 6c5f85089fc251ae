//! Routing table with deterministic best-route selection.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{SimError, SimResult};
use crate::node::{interface, Interface, InterfaceIndex};

use super::Route;

/// Candidate routes keyed by destination.
///
/// Several routes may exist per destination; [`best`](Self::best) picks
/// the cheapest usable one, breaking cost ties by lowest interface index
/// and then lowest next-hop address.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: BTreeMap<Ipv4Addr, Vec<Route>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `route` against the owning node's interfaces and install it.
    ///
    /// Rejects routes through an interface the node does not have, through
    /// a down interface, or with a cost that is NaN, infinite or negative.
    pub fn install(&mut self, route: Route, interfaces: &[Interface]) -> SimResult<()> {
        validate(&route, interfaces)?;
        self.insert(route);
        Ok(())
    }

    /// Insert without validation, replacing a route with the same
    /// destination, egress interface and next hop.
    pub(crate) fn insert(&mut self, route: Route) {
        let routes = self.entries.entry(route.destination).or_default();
        match routes
            .iter_mut()
            .find(|r| r.egress_interface == route.egress_interface && r.next_hop == route.next_hop)
        {
            Some(existing) => *existing = route,
            None => routes.push(route),
        }
    }

    /// Remove every route toward `destination`. Returns how many were removed.
    pub fn remove_destination(&mut self, destination: Ipv4Addr) -> usize {
        self.entries.remove(&destination).map_or(0, |r| r.len())
    }

    /// Remove every route leaving through `egress`. Returns how many were removed.
    pub fn remove_via(&mut self, egress: InterfaceIndex) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, routes| {
            let before = routes.len();
            routes.retain(|r| r.egress_interface != egress);
            removed += before - routes.len();
            !routes.is_empty()
        });
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The best usable route toward `destination`.
    ///
    /// Only routes whose egress interface exists and is up are considered;
    /// with a `hint`, only routes leaving through that interface.
    pub fn best(
        &self,
        destination: Ipv4Addr,
        hint: Option<InterfaceIndex>,
        interfaces: &[Interface],
    ) -> Option<Route> {
        self.entries
            .get(&destination)?
            .iter()
            .filter(|r| hint.map_or(true, |h| r.egress_interface == h))
            .filter(|r| r.is_usable(interfaces))
            .min_by(|a, b| preference(a, b))
            .copied()
    }

    /// All routes, ordered by destination then insertion.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.entries.values().flatten()
    }

    /// Number of installed routes.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lower cost first, then lower interface index, then lower next hop.
fn preference(a: &Route, b: &Route) -> Ordering {
    a.cost
        .total_cmp(&b.cost)
        .then_with(|| a.egress_interface.cmp(&b.egress_interface))
        .then_with(|| a.next_hop.cmp(&b.next_hop))
}

/// Check the route invariants against the owning node's interfaces.
pub fn validate(route: &Route, interfaces: &[Interface]) -> SimResult<()> {
    if !route.cost.is_finite() || route.cost < 0.0 {
        return Err(SimError::InvalidRoute(format!(
            "cost {} toward {} is not a finite non-negative number",
            route.cost, route.destination
        )));
    }
    let Some(iface) = interface::find(interfaces, route.egress_interface) else {
        return Err(SimError::InvalidRoute(format!(
            "egress {} toward {} does not belong to the node",
            route.egress_interface, route.destination
        )));
    };
    if !iface.is_up() {
        return Err(SimError::InterfaceDown {
            node: iface.node(),
            interface: iface.index(),
        });
    }
    Ok(())
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<16} {:<16} {:<6} {:>10}", "Destination", "NextHop", "If", "Cost")?;
        for r in self.routes() {
            writeln!(
                f,
                "{:<16} {:<16} {:<6} {:>10.4}",
                r.destination.to_string(),
                r.next_hop.to_string(),
                r.egress_interface.to_string(),
                r.cost
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{AdminState, Node, NodeId};

    fn node_with(n: usize) -> Node {
        let mut node = Node::new(NodeId::new(0));
        for i in 0..n {
            node.add_interface(Ipv4Addr::new(10, 0, i as u8, 1));
        }
        node
    }

    fn route(dst: u8, via: u32, cost: f64) -> Route {
        Route::new(
            Ipv4Addr::new(10, 0, 0, dst),
            Ipv4Addr::new(10, 0, via as u8, 2),
            InterfaceIndex::new(via),
            cost,
        )
    }

    #[test]
    fn test_equal_cost_prefers_lowest_interface() {
        let node = node_with(2);
        let mut table = RoutingTable::new();
        // Insert the higher index first so insertion order cannot decide.
        table.install(route(2, 1, 1.0), node.interfaces()).unwrap();
        table.install(route(2, 0, 1.0), node.interfaces()).unwrap();

        for _ in 0..10 {
            let best = table.best(Ipv4Addr::new(10, 0, 0, 2), None, node.interfaces()).unwrap();
            assert_eq!(best.egress_interface, InterfaceIndex::new(0));
        }
    }

    #[test]
    fn test_lower_cost_wins() {
        let node = node_with(2);
        let mut table = RoutingTable::new();
        table.install(route(2, 0, 3.0), node.interfaces()).unwrap();
        table.install(route(2, 1, 0.5), node.interfaces()).unwrap();

        let best = table.best(Ipv4Addr::new(10, 0, 0, 2), None, node.interfaces()).unwrap();
        assert_eq!(best.egress_interface, InterfaceIndex::new(1));
    }

    #[test]
    fn test_hint_restricts_egress() {
        let node = node_with(2);
        let mut table = RoutingTable::new();
        table.install(route(2, 0, 1.0), node.interfaces()).unwrap();
        table.install(route(2, 1, 5.0), node.interfaces()).unwrap();

        let best = table
            .best(Ipv4Addr::new(10, 0, 0, 2), Some(InterfaceIndex::new(1)), node.interfaces())
            .unwrap();
        assert_eq!(best.cost, 5.0);
    }

    #[test]
    fn test_down_interface_excluded_from_lookup() {
        let mut node = node_with(2);
        let mut table = RoutingTable::new();
        table.install(route(2, 0, 1.0), node.interfaces()).unwrap();
        table.install(route(2, 1, 1.0), node.interfaces()).unwrap();

        node.interface_mut(InterfaceIndex::new(0)).unwrap().state = AdminState::Down;
        let best = table.best(Ipv4Addr::new(10, 0, 0, 2), None, node.interfaces()).unwrap();
        assert_eq!(best.egress_interface, InterfaceIndex::new(1));

        node.interface_mut(InterfaceIndex::new(1)).unwrap().state = AdminState::Down;
        assert!(table.best(Ipv4Addr::new(10, 0, 0, 2), None, node.interfaces()).is_none());
    }

    #[test]
    fn test_install_rejects_invalid_routes() {
        let mut node = node_with(1);
        let mut table = RoutingTable::new();

        assert!(matches!(
            table.install(route(2, 3, 1.0), node.interfaces()),
            Err(SimError::InvalidRoute(_))
        ));
        assert!(matches!(
            table.install(route(2, 0, f64::NAN), node.interfaces()),
            Err(SimError::InvalidRoute(_))
        ));
        assert!(matches!(
            table.install(route(2, 0, -1.0), node.interfaces()),
            Err(SimError::InvalidRoute(_))
        ));

        node.interface_mut(InterfaceIndex::new(0)).unwrap().state = AdminState::Down;
        assert!(matches!(
            table.install(route(2, 0, 1.0), node.interfaces()),
            Err(SimError::InterfaceDown { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_replaces_same_path() {
        let node = node_with(1);
        let mut table = RoutingTable::new();
        table.install(route(2, 0, 1.0), node.interfaces()).unwrap();
        table.install(route(2, 0, 2.0), node.interfaces()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.routes().next().unwrap().cost, 2.0);
    }

    #[test]
    fn test_remove_via() {
        let node = node_with(2);
        let mut table = RoutingTable::new();
        table.install(route(2, 0, 1.0), node.interfaces()).unwrap();
        table.install(route(3, 0, 1.0), node.interfaces()).unwrap();
        table.install(route(3, 1, 1.0), node.interfaces()).unwrap();

        assert_eq!(table.remove_via(InterfaceIndex::new(0)), 2);
        assert_eq!(table.len(), 1);
        assert!(table.best(Ipv4Addr::new(10, 0, 0, 2), None, node.interfaces()).is_none());
        assert_eq!(table.remove_destination(Ipv4Addr::new(10, 0, 0, 3)), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_display_lists_routes() {
        let node = node_with(1);
        let mut table = RoutingTable::new();
        table.install(route(2, 0, 1.0), node.interfaces()).unwrap();
        let dump = table.to_string();
        assert!(dump.starts_with("Destination"));
        assert!(dump.contains("10.0.0.2"));
        assert!(dump.contains("if0"));
        assert!(dump.contains("1.0000"));
    }
}
