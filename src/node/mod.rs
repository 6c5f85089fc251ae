//! Nodes: addressed interfaces plus an optional routing module.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`], [`InterfaceIndex`] newtypes |
//! | [`interface`] | [`Interface`], [`AdminState`] |
//!
//! Nodes are created by topology code through
//! [`Network`](crate::network::Network) and live for the whole run. A node
//! owns its interfaces and its routing module exclusively.

pub mod id;
pub mod interface;

pub use id::{InterfaceIndex, NodeId};
pub use interface::{AdminState, Interface};

use std::net::Ipv4Addr;

use crate::routing::RoutingProtocol;

/// A simulated host or router.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) interfaces: Vec<Interface>,
    pub(crate) routing: Option<Box<dyn RoutingProtocol>>,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Node {
            id,
            interfaces: Vec::new(),
            routing: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface(&self, index: InterfaceIndex) -> Option<&Interface> {
        interface::find(&self.interfaces, index)
    }

    pub(crate) fn interface_mut(&mut self, index: InterfaceIndex) -> Option<&mut Interface> {
        self.interfaces.get_mut(index.as_usize())
    }

    pub(crate) fn add_interface(&mut self, address: Ipv4Addr) -> InterfaceIndex {
        let index = InterfaceIndex::new(self.interfaces.len() as u32);
        self.interfaces.push(Interface::new(self.id, index, address));
        index
    }

    /// Returns `true` if `address` belongs to one of this node's interfaces.
    pub fn owns_address(&self, address: Ipv4Addr) -> bool {
        interface::owns_address(&self.interfaces, address)
    }

    /// Name of the attached routing protocol, if any.
    pub fn routing_name(&self) -> Option<&'static str> {
        self.routing.as_ref().map(|r| r.name())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("interfaces", &self.interfaces)
            .field("routing", &self.routing_name())
            .finish()
    }
}
