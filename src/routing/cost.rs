//! Cost-based routing with periodic recomputation.
//!
//! A [`CostBasedRouting`] instance knows a set of candidate paths
//! (destination, next hop, egress interface). Every `interval` it asks its
//! [`CostMetric`] for a fresh cost per candidate and rebuilds its table.
//! Exactly one update event is outstanding while the module is active.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::{Rc, Weak};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use tracing::{debug, info, trace, warn};

use crate::error::{SimError, SimResult};
use crate::event::EventId;
use crate::node::{interface, Interface, InterfaceIndex, NodeId};
use crate::simulation::Simulation;
use crate::time::{SimDuration, VirtualTime};

use super::{Route, RoutingProtocol, RoutingState, RoutingTable};

// ── Metrics ───────────────────────────────────────────────────────────

/// What a metric sees when pricing one candidate path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostInput {
    pub node: NodeId,
    pub destination: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub egress: InterfaceIndex,
    pub now: VirtualTime,
}

/// Prices a candidate path. Lower is better.
///
/// Returning NaN, an infinity or a negative number withdraws the candidate
/// until the next update.
pub trait CostMetric {
    fn cost(&mut self, input: &CostInput) -> f64;
}

impl<F> CostMetric for F
where
    F: FnMut(&CostInput) -> f64,
{
    fn cost(&mut self, input: &CostInput) -> f64 {
        self(input)
    }
}

/// The same cost for every path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformCost(pub f64);

impl CostMetric for UniformCost {
    fn cost(&mut self, _input: &CostInput) -> f64 {
        self.0
    }
}

/// Fixed per-interface weights with a fallback for unlisted interfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceWeights {
    weights: BTreeMap<InterfaceIndex, f64>,
    fallback: f64,
}

impl InterfaceWeights {
    pub fn new(fallback: f64) -> Self {
        InterfaceWeights {
            weights: BTreeMap::new(),
            fallback,
        }
    }

    pub fn with_weight(mut self, egress: InterfaceIndex, weight: f64) -> Self {
        self.weights.insert(egress, weight);
        self
    }

    pub fn set_weight(&mut self, egress: InterfaceIndex, weight: f64) {
        self.weights.insert(egress, weight);
    }
}

impl CostMetric for InterfaceWeights {
    fn cost(&mut self, input: &CostInput) -> f64 {
        self.weights.get(&input.egress).copied().unwrap_or(self.fallback)
    }
}

/// A base cost plus a Poisson-distributed perturbation, redrawn at every
/// update. The result is never below 1.
///
/// A demo metric for exercising route churn; it models no real link
/// property.
#[derive(Debug, Clone)]
pub struct PoissonCost {
    base: f64,
    distribution: Poisson<f64>,
    rng: StdRng,
}

impl PoissonCost {
    /// Fails with [`SimError::InvalidConfig`] unless `mean` is positive and
    /// finite.
    pub fn new(base: f64, mean: f64, seed: u64) -> SimResult<Self> {
        if !mean.is_finite() {
            return Err(SimError::InvalidConfig(format!(
                "poisson mean must be finite, got {mean}"
            )));
        }
        let distribution = Poisson::new(mean).map_err(|err| {
            SimError::InvalidConfig(format!("poisson mean {mean}: {err}"))
        })?;
        Ok(PoissonCost {
            base,
            distribution,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl CostMetric for PoissonCost {
    fn cost(&mut self, _input: &CostInput) -> f64 {
        (self.base + self.distribution.sample(&mut self.rng)).max(1.0)
    }
}

// ── CostBasedRouting ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    destination: Ipv4Addr,
    next_hop: Ipv4Addr,
    egress: InterfaceIndex,
}

struct CostState {
    node: Option<NodeId>,
    interval: SimDuration,
    metric: Box<dyn CostMetric>,
    candidates: Vec<Candidate>,
    down: BTreeSet<InterfaceIndex>,
    table: RoutingTable,
    timer: Option<EventId>,
    state: RoutingState,
    updates: u64,
}

impl CostState {
    /// Rebuild the table from scratch, skipping candidates through down
    /// interfaces and candidates the metric withdraws.
    fn recompute(&mut self, now: VirtualTime) {
        let Some(node) = self.node else { return };
        self.table.clear();
        for c in &self.candidates {
            if self.down.contains(&c.egress) {
                continue;
            }
            let cost = self.metric.cost(&CostInput {
                node,
                destination: c.destination,
                next_hop: c.next_hop,
                egress: c.egress,
                now,
            });
            if !cost.is_finite() || cost < 0.0 {
                trace!(%node, destination = %c.destination, cost, "candidate withdrawn");
                continue;
            }
            self.table
                .insert(Route::new(c.destination, c.next_hop, c.egress, cost));
        }
        self.updates += 1;
        debug!(%node, %now, routes = self.table.len(), "route costs recomputed");
    }
}

/// Routing whose route costs are refreshed every `interval` of virtual time.
///
/// Cloning yields another handle to the same state, so topology code can
/// keep one after handing the module to a node.
#[derive(Clone)]
pub struct CostBasedRouting {
    inner: Rc<RefCell<CostState>>,
}

impl CostBasedRouting {
    pub fn new(interval: SimDuration, metric: impl CostMetric + 'static) -> Self {
        CostBasedRouting {
            inner: Rc::new(RefCell::new(CostState {
                node: None,
                interval,
                metric: Box::new(metric),
                candidates: Vec::new(),
                down: BTreeSet::new(),
                table: RoutingTable::new(),
                timer: None,
                state: RoutingState::Uninitialized,
                updates: 0,
            })),
        }
    }

    /// Register a candidate path. It is priced from the next update on.
    pub fn add_candidate(&self, destination: Ipv4Addr, next_hop: Ipv4Addr, egress: InterfaceIndex) {
        let candidate = Candidate {
            destination,
            next_hop,
            egress,
        };
        let mut state = self.inner.borrow_mut();
        if !state.candidates.contains(&candidate) {
            state.candidates.push(candidate);
        }
    }

    /// Builder form of [`add_candidate`](Self::add_candidate).
    pub fn with_candidate(
        self,
        destination: Ipv4Addr,
        next_hop: Ipv4Addr,
        egress: InterfaceIndex,
    ) -> Self {
        self.add_candidate(destination, next_hop, egress);
        self
    }

    pub fn interval(&self) -> SimDuration {
        self.inner.borrow().interval
    }

    /// Number of recomputations performed so far, including the one at attach.
    pub fn updates(&self) -> u64 {
        self.inner.borrow().updates
    }

    /// The outstanding update event, if any.
    pub fn pending_update(&self) -> Option<EventId> {
        self.inner.borrow().timer
    }

    /// Current table, rebuilt at the last update.
    pub fn table(&self) -> RoutingTable {
        self.inner.borrow().table.clone()
    }

    /// Schedule the next update, holding the state only weakly.
    fn arm(shared: &Rc<RefCell<CostState>>, sim: &mut Simulation) -> SimResult<()> {
        let weak: Weak<RefCell<CostState>> = Rc::downgrade(shared);
        let interval = shared.borrow().interval;
        let id = sim.schedule(interval, move |sim: &mut Simulation| {
            let Some(shared) = weak.upgrade() else {
                return Ok(());
            };
            {
                let mut state = shared.borrow_mut();
                state.timer = None;
                if state.state != RoutingState::Active {
                    return Ok(());
                }
                state.recompute(sim.now());
            }
            Self::arm(&shared, sim)
        })?;
        shared.borrow_mut().timer = Some(id);
        Ok(())
    }
}

impl fmt::Debug for CostBasedRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("CostBasedRouting")
            .field("node", &state.node)
            .field("interval", &state.interval)
            .field("candidates", &state.candidates.len())
            .field("routes", &state.table.len())
            .field("state", &state.state)
            .field("updates", &state.updates)
            .finish()
    }
}

impl RoutingProtocol for CostBasedRouting {
    fn name(&self) -> &'static str {
        "cost-based"
    }

    fn attach(
        &mut self,
        node: NodeId,
        interfaces: &[Interface],
        sim: &mut Simulation,
    ) -> SimResult<()> {
        {
            let mut state = self.inner.borrow_mut();
            if state.interval.is_negative() || state.interval.is_zero() {
                return Err(SimError::InvalidConfig(format!(
                    "routing update interval must be positive, got {}",
                    state.interval
                )));
            }
            if let Some(c) = state
                .candidates
                .iter()
                .find(|c| interface::find(interfaces, c.egress).is_none())
            {
                return Err(SimError::InvalidRoute(format!(
                    "egress {} toward {} does not belong to node {}",
                    c.egress, c.destination, node
                )));
            }
            if let Some(stale) = state.timer.take() {
                sim.cancel(stale);
            }
            state.node = Some(node);
            state.down = interfaces
                .iter()
                .filter(|i| !i.is_up())
                .map(Interface::index)
                .collect();
            state.state = RoutingState::Active;
            state.recompute(sim.now());
            info!(
                %node,
                interval = %state.interval,
                candidates = state.candidates.len(),
                "cost-based routing attached"
            );
        }
        Self::arm(&self.inner, sim)
    }

    fn detach(&mut self, sim: &mut Simulation) {
        let mut state = self.inner.borrow_mut();
        if let Some(timer) = state.timer.take() {
            sim.cancel(timer);
        }
        if state.state == RoutingState::Active {
            debug!(node = ?state.node, "cost-based routing detached");
        }
        state.state = RoutingState::Detached;
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
            debug!(node = ?state.node, interface = %index, "interface up, routes return at next update");
        }
    }

    fn notify_interface_down(&mut self, index: InterfaceIndex) {
        let mut state = self.inner.borrow_mut();
        state.down.insert(index);
        let purged = state.table.remove_via(index);
        if purged > 0 {
            warn!(node = ?state.node, interface = %index, purged, "interface down, routes purged");
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
