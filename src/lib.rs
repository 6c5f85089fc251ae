//! # simnet: Deterministic Network Simulation Kernel
//!
//! A single-threaded discrete-event core for simulating packet networks.
//! Nothing runs on wall-clock time: every action is a callback scheduled
//! on a virtual clock, and identical inputs (including the RNG seed)
//! reproduce identical runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  UdpSocket / EchoServer / PacketSink        │ ← timer-driven applications
//! │  ┌──────────────────────────────────────┐  │
//! │  │  Network                              │  │ ← links, forwarding, ports
//! │  │  ┌────────────────────────────────┐  │  │
//! │  │  │  RoutingProtocol per node       │  │  │ ← static / cost / distance-vector
//! │  │  └────────────────────────────────┘  │  │
//! │  └──────────────────────────────────────┘  │
//! │  ┌──────────────────────────────────────┐  │
//! │  │  Simulation                           │  │ ← run / stop / destroy
//! │  │  ┌────────────┐  ┌────────────────┐  │  │
//! │  │  │ Scheduler  │  │  VirtualTime   │  │  │ ← (time, seq) min-heap, clock
//! │  │  └────────────┘  └────────────────┘  │  │
//! │  └──────────────────────────────────────┘  │
//! └────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use std::net::{Ipv4Addr, SocketAddrV4};
//! use simnet::network::{Endpoint, LinkConfig, Network};
//! use simnet::routing::{Route, StaticRouting};
//! use simnet::socket::{PacketSink, SendCount, SendSchedule, UdpSocket};
//! use simnet::{SimDuration, Simulation};
//!
//! # fn main() -> Result<(), simnet::SimError> {
//! let mut sim = Simulation::new();
//! let net = Network::new(1);
//! let (a, b) = (net.add_node(), net.add_node());
//! let ia = net.add_interface(a, Ipv4Addr::new(10, 0, 0, 1))?;
//! let ib = net.add_interface(b, Ipv4Addr::new(10, 0, 0, 2))?;
//! net.connect(
//!     Endpoint { node: a, interface: ia },
//!     Endpoint { node: b, interface: ib },
//!     LinkConfig::point_to_point(SimDuration::from_millis(5)),
//! )?;
//! let to_b = Route::new(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 2), ia, 1.0);
//! net.attach_routing(&mut sim, a, StaticRouting::new().with_route(to_b))?;
//!
//! let sink = PacketSink::install(&net, b, 9)?;
//! let tx = UdpSocket::new(&net, a)?;
//! tx.connect(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9))?;
//! tx.start_sending(
//!     &mut sim,
//!     SendSchedule::new(64, SendCount::Bounded(3), SimDuration::from_secs(1)),
//! )?;
//! sim.run(None)?;
//! assert_eq!(sink.count(), 3);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod network;
pub mod node;
pub mod packet;
pub mod routing;
pub mod scheduler;
pub mod simulation;
pub mod socket;
pub mod telemetry;
pub mod time;

// Re-exports for convenience.
pub use config::SimulationConfig;
pub use error::{NoRouteError, SimError, SimResult};
pub use event::{Callback, EventId};
pub use network::{Network, NetworkStats};
pub use node::{AdminState, InterfaceIndex, NodeId};
pub use packet::{Packet, PacketTag};
pub use routing::{CostBasedRouting, DistanceVectorRouting, Route, RoutingProtocol, StaticRouting};
pub use simulation::{Simulation, SimulationState};
pub use socket::{SendCount, SendSchedule, SocketState, UdpSocket};
pub use time::{SimDuration, VirtualTime};
