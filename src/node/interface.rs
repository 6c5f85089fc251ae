//! Network interfaces and their administrative state.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::id::{InterfaceIndex, NodeId};
use crate::network::LinkId;

/// Administrative state, toggled by topology code (e.g. link failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminState {
    Up,
    Down,
}

/// An addressed attachment point of a node.
///
/// `node` is a plain id back-reference; the node owns the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub(crate) index: InterfaceIndex,
    pub(crate) node: NodeId,
    pub(crate) address: Ipv4Addr,
    pub(crate) state: AdminState,
    pub(crate) link: Option<LinkId>,
}

impl Interface {
    pub(crate) fn new(node: NodeId, index: InterfaceIndex, address: Ipv4Addr) -> Self {
        Interface {
            index,
            node,
            address,
            state: AdminState::Up,
            link: None,
        }
    }

    pub fn index(&self) -> InterfaceIndex {
        self.index
    }

    /// The owning node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn state(&self) -> AdminState {
        self.state
    }

    #[inline]
    pub fn is_up(&self) -> bool {
        self.state == AdminState::Up
    }

    /// The link this interface is attached to, if any.
    pub fn link(&self) -> Option<LinkId> {
        self.link
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            AdminState::Up => "up",
            AdminState::Down => "down",
        };
        write!(f, "{}/{} {} ({})", self.node, self.index, self.address, state)
    }
}

/// Look up an interface by index in a node's interface list.
pub fn find(interfaces: &[Interface], index: InterfaceIndex) -> Option<&Interface> {
    interfaces.get(index.as_usize())
}

/// Returns `true` if `address` is assigned to any interface in the list.
pub fn owns_address(interfaces: &[Interface], address: Ipv4Addr) -> bool {
    interfaces.iter().any(|i| i.address == address)
}
