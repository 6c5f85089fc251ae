//! Static routing: routes installed explicitly by topology code.

use std::any::Any;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::SimResult;
use crate::node::{Interface, InterfaceIndex, NodeId};
use crate::simulation::Simulation;

use super::{table, Route, RoutingProtocol, RoutingState, RoutingTable};

/// Routes that never change on their own.
///
/// Routes queued with [`with_route`](Self::with_route) are validated and
/// installed at attach. Routes through an interface that later goes down
/// stay installed but are skipped by lookups until it comes back up.
#[derive(Debug)]
pub struct StaticRouting {
    node: Option<NodeId>,
    pending: Vec<Route>,
    table: RoutingTable,
    state: RoutingState,
}

impl StaticRouting {
    pub fn new() -> Self {
        StaticRouting {
            node: None,
            pending: Vec::new(),
            table: RoutingTable::new(),
            state: RoutingState::Uninitialized,
        }
    }

    /// Queue a route for installation at attach.
    pub fn with_route(mut self, route: Route) -> Self {
        self.pending.push(route);
        self
    }

    /// Install a route on an attached node.
    pub fn add_route(&mut self, route: Route, interfaces: &[Interface]) -> SimResult<()> {
        self.table.install(route, interfaces)?;
        debug!(node = ?self.node, %route, "static route added");
        Ok(())
    }

    /// Install a host route with the neighbour as next hop.
    pub fn add_host_route(
        &mut self,
        destination: Ipv4Addr,
        egress: InterfaceIndex,
        cost: f64,
        interfaces: &[Interface],
    ) -> SimResult<()> {
        self.add_route(Route::new(destination, destination, egress, cost), interfaces)
    }

    /// Remove every route toward `destination`. Returns how many were removed.
    pub fn remove_route(&mut self, destination: Ipv4Addr) -> usize {
        self.table.remove_destination(destination)
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }
}

impl Default for StaticRouting {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingProtocol for StaticRouting {
    fn name(&self) -> &'static str {
        "static"
    }

    fn attach(
        &mut self,
        node: NodeId,
        interfaces: &[Interface],
        _sim: &mut Simulation,
    ) -> SimResult<()> {
        // All or nothing: a bad route leaves the table and the queue as they were.
        for route in &self.pending {
            table::validate(route, interfaces)?;
        }
        self.node = Some(node);
        for route in std::mem::take(&mut self.pending) {
            self.table.insert(route);
        }
        self.state = RoutingState::Active;
        debug!(%node, routes = self.table.len(), "static routing attached");
        Ok(())
    }

    fn detach(&mut self, _sim: &mut Simulation) {
        self.state = RoutingState::Detached;
    }

    fn state(&self) -> RoutingState {
        self.state
    }

    fn lookup(
        &self,
        destination: Ipv4Addr,
        hint: Option<InterfaceIndex>,
        interfaces: &[Interface],
    ) -> Option<Route> {
        self.table.best(destination, hint, interfaces)
    }

    fn routes(&self) -> Vec<Route> {
        self.table.routes().copied().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
