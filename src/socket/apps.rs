//! Stock applications built on [`UdpSocket`].

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use tracing::trace;

use crate::error::SimResult;
use crate::network::Network;
use crate::node::NodeId;
use crate::packet::Packet;
use crate::simulation::Simulation;
use crate::time::{SimDuration, VirtualTime};

use super::UdpSocket;

// ── EchoServer ────────────────────────────────────────────────────────

/// Sends every received datagram back to its source, tags included.
#[derive(Debug, Clone)]
pub struct EchoServer {
    socket: UdpSocket,
    echoed: Rc<RefCell<u64>>,
}

impl EchoServer {
    /// Listen on `port` for every address of `node`.
    pub fn install(network: &Network, node: NodeId, port: u16) -> SimResult<Self> {
        let socket = UdpSocket::new(network, node)?;
        socket.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;

        let echoed = Rc::new(RefCell::new(0));
        let counter = echoed.clone();
        let handle = socket.downgrade();
        socket.set_receive_callback(move |sim: &mut Simulation, packet: Packet, from| {
            let Some(socket) = handle.upgrade() else {
                return Ok(());
            };
            let mut reply = Packet::new(socket.network.next_packet_uid(), packet.payload().clone());
            for tag in packet.tags() {
                reply.add_tag(*tag);
            }
            trace!(node = %socket.node(), %from, uid = reply.uid(), "echoing datagram");
            socket.send_to(sim, reply, from)?;
            *counter.borrow_mut() += 1;
            Ok(())
        });
        Ok(EchoServer { socket, echoed })
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    /// Datagrams echoed so far.
    pub fn echoed(&self) -> u64 {
        *self.echoed.borrow()
    }
}

// ── PacketSink ────────────────────────────────────────────────────────

/// One datagram seen by a [`PacketSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub time: VirtualTime,
    pub from: SocketAddrV4,
    pub uid: u64,
    pub size: usize,
    /// Arrival time minus the send-timestamp tag, if the packet had one.
    pub latency: Option<SimDuration>,
}

/// Records every datagram it receives.
#[derive(Debug, Clone)]
pub struct PacketSink {
    socket: UdpSocket,
    arrivals: Rc<RefCell<Vec<Arrival>>>,
}

impl PacketSink {
    /// Listen on `port` for every address of `node`.
    pub fn install(network: &Network, node: NodeId, port: u16) -> SimResult<Self> {
        let socket = UdpSocket::new(network, node)?;
        socket.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        Ok(Self::attach(socket))
    }

    /// Record arrivals on an already bound socket.
    pub fn attach(socket: UdpSocket) -> Self {
        let arrivals = Rc::new(RefCell::new(Vec::new()));
        let log = arrivals.clone();
        socket.set_receive_callback(move |sim: &mut Simulation, packet: Packet, from| {
            let now = sim.now();
            log.borrow_mut().push(Arrival {
                time: now,
                from,
                uid: packet.uid(),
                size: packet.payload_len(),
                latency: packet.elapsed_since_send(now),
            });
            Ok(())
        });
        PacketSink { socket, arrivals }
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    pub fn arrivals(&self) -> Vec<Arrival> {
        self.arrivals.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.arrivals.borrow().len()
    }

    /// Mean latency over arrivals that carried a send timestamp.
    pub fn mean_latency(&self) -> Option<SimDuration> {
        let arrivals = self.arrivals.borrow();
        let samples: Vec<i64> = arrivals
            .iter()
            .filter_map(|a| a.latency.map(SimDuration::as_nanos))
            .collect();
        if samples.is_empty() {
            return None;
        }
        let total: i128 = samples.iter().map(|n| i128::from(*n)).sum();
        Some(SimDuration::from_nanos((total / samples.len() as i128) as i64))
    }
}
