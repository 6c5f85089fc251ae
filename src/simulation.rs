/// Simulation execution loop.
///
/// Owns the scheduler and the virtual clock: pops events, advances time,
/// invokes callbacks. The loop is synchronous and single-threaded, so
/// every run with the same schedule of delays is exactly reproducible.

use tracing::{debug, info, trace};

use crate::error::{SimError, SimResult};
use crate::event::{Callback, EventId};
use crate::scheduler::Scheduler;
use crate::time::{SimDuration, VirtualTime};

// ── State ─────────────────────────────────────────────────────────────

/// Lifecycle of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationState {
    /// Constructed, never run.
    Idle,
    /// Inside `run` or `step`.
    Running,
    /// A run returned; `run` may be called again to resume.
    Stopped,
    /// Terminal. All pending events were dropped.
    Destroyed,
}

impl std::fmt::Display for SimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SimulationState::Idle => "idle",
            SimulationState::Running => "running",
            SimulationState::Stopped => "stopped",
            SimulationState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// What a single `step` executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRecord {
    pub event_id: EventId,
    pub seq: u64,
    pub time: VirtualTime,
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Every component that needs to schedule work receives `&mut Simulation`
/// explicitly; there is no ambient global scheduler, so tests can run any
/// number of independent simulations side by side.
///
/// ```rust
/// use simnet::{Simulation, SimDuration, VirtualTime};
///
/// let mut sim = Simulation::new();
/// sim.schedule(SimDuration::from_secs(1), |sim| {
///     assert_eq!(sim.now(), VirtualTime::from_secs(1));
///     Ok(())
/// })
/// .unwrap();
/// assert_eq!(sim.run(None).unwrap(), 1);
/// ```
pub struct Simulation {
    scheduler: Scheduler,
    current_time: VirtualTime,
    state: SimulationState,
    events_executed: u64,
    stop_requested: bool,
}

impl Simulation {
    /// Create a new simulation starting at time zero.
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            current_time: VirtualTime::ZERO,
            state: SimulationState::Idle,
            events_executed: 0,
            stop_requested: false,
        }
    }

    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.current_time
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Total events executed so far (cancelled events are not counted).
    pub fn events_executed(&self) -> u64 {
        self.events_executed
    }

    /// Number of live events waiting in the queue.
    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    /// Returns `true` if no live event remains.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }

    // ── Scheduling ────────────────────────────────────────────────

    /// Schedule `callback` to run `delay` after the current time.
    ///
    /// Negative delays are rejected with [`SimError::NegativeDelay`].
    pub fn schedule<F>(&mut self, delay: SimDuration, callback: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulation) -> SimResult<()> + 'static,
    {
        self.ensure_alive()?;
        if delay.is_negative() {
            return Err(SimError::NegativeDelay(delay));
        }
        let at = self
            .current_time
            .checked_add(delay)
            .ok_or(SimError::TimeOverflow {
                now: self.current_time,
                delay,
            })?;
        Ok(self.enqueue(at, Box::new(callback)))
    }

    /// Schedule `callback` at the current time, after every event already
    /// queued for this instant.
    pub fn schedule_now<F>(&mut self, callback: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulation) -> SimResult<()> + 'static,
    {
        self.schedule(SimDuration::ZERO, callback)
    }

    /// Schedule `callback` at an absolute virtual time.
    ///
    /// Times before `now` are rejected with [`SimError::NonCausalEvent`].
    pub fn schedule_at<F>(&mut self, at: VirtualTime, callback: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulation) -> SimResult<()> + 'static,
    {
        self.ensure_alive()?;
        if at.is_before(self.current_time) {
            return Err(SimError::NonCausalEvent {
                requested: at,
                current: self.current_time,
            });
        }
        Ok(self.enqueue(at, Box::new(callback)))
    }

    /// Cancel a scheduled event.
    ///
    /// Idempotent, and a no-op for events that already fired or for any
    /// handle after `destroy`. Returns `true` if a pending event was
    /// cancelled by this call.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let cancelled = self.scheduler.cancel(id);
        if cancelled {
            trace!(event = %id, "event cancelled");
        }
        cancelled
    }

    /// Returns `true` if the event is still waiting to fire.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.scheduler.is_pending(id)
    }

    /// Virtual time left before a pending event fires.
    pub fn delay_left(&self, id: EventId) -> Option<SimDuration> {
        self.scheduler
            .scheduled_at(id)?
            .duration_since(self.current_time)
    }

    // ── Execution ─────────────────────────────────────────────────

    /// Run until the queue is empty or the next event lies beyond
    /// `stop_time` (events exactly at `stop_time` still execute).
    ///
    /// When a `stop_time` is given and reached, the clock is advanced to
    /// it. A callback error aborts the run, leaves the simulation
    /// `Stopped` and is returned unchanged.
    ///
    /// Returns the number of events executed during this call.
    pub fn run(&mut self, stop_time: Option<VirtualTime>) -> SimResult<u64> {
        self.begin()?;
        let start = self.events_executed;
        debug!(now = %self.current_time, ?stop_time, "run started");

        loop {
            if self.stop_requested {
                break;
            }
            let Some(next) = self.scheduler.peek_time() else {
                self.advance_to(stop_time);
                break;
            };
            if stop_time.is_some_and(|stop| next > stop) {
                self.advance_to(stop_time);
                break;
            }
            self.dispatch_next()?;
        }

        self.finish();
        let executed = self.events_executed - start;
        debug!(now = %self.current_time, executed, "run finished");
        Ok(executed)
    }

    /// Execute exactly one due event.
    ///
    /// Returns `None` if the queue is empty.
    pub fn step(&mut self) -> SimResult<Option<StepRecord>> {
        self.begin()?;
        let record = self.dispatch_next();
        self.finish();
        record
    }

    /// Ask a running simulation to return after the current callback.
    ///
    /// Pending events stay queued; a later `run` resumes them.
    pub fn stop(&mut self) {
        if self.state == SimulationState::Running {
            self.stop_requested = true;
        }
    }

    /// Drop every pending event without executing it.
    ///
    /// Terminal: further scheduling and running fail with
    /// [`SimError::Destroyed`]. Safe to call from inside a callback.
    pub fn destroy(&mut self) {
        if self.state == SimulationState::Destroyed {
            return;
        }
        let dropped = self.scheduler.len();
        self.scheduler.clear();
        self.state = SimulationState::Destroyed;
        info!(now = %self.current_time, dropped, "simulation destroyed");
    }

    // ── Internals ─────────────────────────────────────────────────

    fn ensure_alive(&self) -> SimResult<()> {
        if self.state == SimulationState::Destroyed {
            return Err(SimError::Destroyed);
        }
        Ok(())
    }

    fn enqueue(&mut self, at: VirtualTime, callback: Callback) -> EventId {
        let id = self.scheduler.schedule(at, callback);
        trace!(event = %id, at = %at, "event scheduled");
        id
    }

    fn begin(&mut self) -> SimResult<()> {
        match self.state {
            SimulationState::Destroyed => Err(SimError::Destroyed),
            SimulationState::Running => Err(SimError::ReentrantRun),
            SimulationState::Idle | SimulationState::Stopped => {
                self.state = SimulationState::Running;
                self.stop_requested = false;
                Ok(())
            }
        }
    }

    fn finish(&mut self) {
        if self.state == SimulationState::Running {
            self.state = SimulationState::Stopped;
        }
        self.stop_requested = false;
    }

    fn advance_to(&mut self, stop_time: Option<VirtualTime>) {
        if let Some(stop) = stop_time {
            if self.current_time < stop {
                self.current_time = stop;
            }
        }
    }

    /// Pop one event and run it. The event is fully removed from the
    /// queue before its callback starts, so callbacks may schedule or
    /// cancel freely.
    fn dispatch_next(&mut self) -> SimResult<Option<StepRecord>> {
        let Some(event) = self.scheduler.pop_next() else {
            return Ok(None);
        };

        // Virtual time must never go backward.
        debug_assert!(
            event.scheduled_at >= self.current_time,
            "time went backward: current={}, event={}",
            self.current_time,
            event.scheduled_at
        );
        self.current_time = event.scheduled_at;
        self.events_executed += 1;
        trace!(event = %event.id, seq = event.seq, now = %self.current_time, "dispatching event");

        let record = StepRecord {
            event_id: event.id,
            seq: event.seq,
            time: event.scheduled_at,
        };
        if let Err(err) = (event.callback)(self) {
            debug!(event = %record.event_id, now = %self.current_time, %err, "callback failed, aborting run");
            self.finish();
            return Err(err);
        }
        Ok(Some(record))
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.current_time)
            .field("state", &self.state)
            .field("events_executed", &self.events_executed)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    type Log = Rc<RefCell<Vec<(u64, &'static str)>>>;

    fn record(log: &Log, label: &'static str) -> impl FnOnce(&mut Simulation) -> SimResult<()> {
        let log = log.clone();
        move |sim: &mut Simulation| {
            log.borrow_mut().push((sim.now().ticks(), label));
            Ok(())
        }
    }

    fn labels(log: &Log) -> Vec<&'static str> {
        log.borrow().iter().map(|(_, l)| *l).collect()
    }

    #[test]
    fn test_equal_delays_run_in_schedule_order() {
        let mut sim = Simulation::new();
        let log = Log::default();

        sim.schedule(SimDuration::from_secs(5), record(&log, "A")).unwrap();
        sim.schedule(SimDuration::from_secs(3), record(&log, "B")).unwrap();
        sim.schedule(SimDuration::from_secs(3), record(&log, "C")).unwrap();

        assert_eq!(sim.run(None).unwrap(), 3);
        assert_eq!(labels(&log), vec!["B", "C", "A"]);
        assert_eq!(sim.now(), VirtualTime::from_secs(5));
        assert_eq!(sim.state(), SimulationState::Stopped);
    }

    #[test]
    fn test_earlier_delay_runs_first() {
        for (t1, t2) in [(0, 1), (1, 2), (5, 100), (999, 1000)] {
            let mut sim = Simulation::new();
            let log = Log::default();
            sim.schedule(SimDuration::from_millis(t2), record(&log, "late")).unwrap();
            sim.schedule(SimDuration::from_millis(t1), record(&log, "early")).unwrap();
            sim.run(None).unwrap();
            assert_eq!(labels(&log), vec!["early", "late"]);
        }
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut sim = Simulation::new();
        let err = sim
            .schedule(SimDuration::from_secs(-1), |_| Ok(()))
            .unwrap_err();
        assert_eq!(err, SimError::NegativeDelay(SimDuration::from_secs(-1)));
        assert_eq!(sim.pending_events(), 0);
    }

    #[test]
    fn test_schedule_at_in_past_rejected() {
        let mut sim = Simulation::new();
        sim.schedule(SimDuration::from_secs(2), |_| Ok(())).unwrap();
        sim.run(None).unwrap();

        let err = sim
            .schedule_at(VirtualTime::from_secs(1), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SimError::NonCausalEvent { .. }));
    }

    #[test]
    fn test_cancelled_event_never_runs() {
        let mut sim = Simulation::new();
        let log = Log::default();

        let a = sim.schedule(SimDuration::from_secs(1), record(&log, "a")).unwrap();
        sim.schedule(SimDuration::from_secs(2), record(&log, "b")).unwrap();
        assert!(sim.cancel(a));
        assert!(!sim.cancel(a));

        assert_eq!(sim.run(None).unwrap(), 1);
        assert_eq!(labels(&log), vec!["b"]);
        assert_eq!(sim.events_executed(), 1);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut sim = Simulation::new();
        let a = sim.schedule(SimDuration::from_secs(1), |_| Ok(())).unwrap();
        sim.run(None).unwrap();
        assert!(!sim.is_pending(a));
        assert!(!sim.cancel(a));
    }

    #[test]
    fn test_callback_cancels_later_event() {
        let mut sim = Simulation::new();
        let log = Log::default();

        let victim = sim.schedule(SimDuration::from_secs(2), record(&log, "victim")).unwrap();
        sim.schedule(SimDuration::from_secs(1), move |sim| {
            assert!(sim.cancel(victim));
            Ok(())
        })
        .unwrap();

        sim.run(None).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_reentrant_scheduling() {
        let mut sim = Simulation::new();
        let log = Log::default();

        fn tick(log: Log, remaining: u32) -> Callback {
            Box::new(move |sim: &mut Simulation| {
                log.borrow_mut().push((sim.now().ticks(), "tick"));
                if remaining > 1 {
                    sim.schedule(SimDuration::from_nanos(10), tick(log.clone(), remaining - 1))?;
                    // Same-instant follow-up runs after everything already queued now.
                    sim.schedule_now(record(&log, "same-instant"))?;
                }
                Ok(())
            })
        }

        sim.schedule_now(tick(log.clone(), 3)).unwrap();
        sim.run(None).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (0, "tick"),
                (0, "same-instant"),
                (10, "tick"),
                (10, "same-instant"),
                (20, "tick"),
            ]
        );
    }

    #[test]
    fn test_stop_time_leaves_later_events_queued() {
        let mut sim = Simulation::new();
        let log = Log::default();

        sim.schedule(SimDuration::from_secs(1), record(&log, "one")).unwrap();
        sim.schedule(SimDuration::from_secs(2), record(&log, "two")).unwrap();
        sim.schedule(SimDuration::from_secs(3), record(&log, "three")).unwrap();

        assert_eq!(sim.run(Some(VirtualTime::from_secs(2))).unwrap(), 2);
        assert_eq!(labels(&log), vec!["one", "two"]);
        assert_eq!(sim.now(), VirtualTime::from_secs(2));
        assert_eq!(sim.pending_events(), 1);

        // Resume from Stopped.
        assert_eq!(sim.run(None).unwrap(), 1);
        assert_eq!(labels(&log), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_stop_time_advances_clock_when_queue_drains() {
        let mut sim = Simulation::new();
        sim.schedule(SimDuration::from_secs(1), |_| Ok(())).unwrap();
        sim.run(Some(VirtualTime::from_secs(10))).unwrap();
        assert_eq!(sim.now(), VirtualTime::from_secs(10));
    }

    #[test]
    fn test_stop_from_callback() {
        let mut sim = Simulation::new();
        let log = Log::default();

        sim.schedule(SimDuration::from_secs(1), |sim| {
            sim.stop();
            Ok(())
        })
        .unwrap();
        sim.schedule(SimDuration::from_secs(2), record(&log, "after")).unwrap();

        assert_eq!(sim.run(None).unwrap(), 1);
        assert_eq!(sim.now(), VirtualTime::from_secs(1));
        assert!(log.borrow().is_empty());

        sim.run(None).unwrap();
        assert_eq!(labels(&log), vec!["after"]);
    }

    #[test]
    fn test_callback_error_aborts_run() {
        let mut sim = Simulation::new();
        let log = Log::default();

        sim.schedule(SimDuration::from_secs(1), |_| {
            Err(SimError::Application("boom".into()))
        })
        .unwrap();
        sim.schedule(SimDuration::from_secs(2), record(&log, "after")).unwrap();

        let err = sim.run(None).unwrap_err();
        assert_eq!(err, SimError::Application("boom".into()));
        assert_eq!(sim.state(), SimulationState::Stopped);
        assert_eq!(sim.now(), VirtualTime::from_secs(1));
        assert!(log.borrow().is_empty());
        assert_eq!(sim.pending_events(), 1);
    }

    #[test]
    fn test_reentrant_run_rejected() {
        let mut sim = Simulation::new();
        let seen = Rc::new(RefCell::new(None));
        let seen_cb = seen.clone();
        sim.schedule_now(move |sim| {
            *seen_cb.borrow_mut() = Some(sim.run(None));
            Ok(())
        })
        .unwrap();
        sim.run(None).unwrap();
        assert_eq!(*seen.borrow(), Some(Err(SimError::ReentrantRun)));
    }

    #[test]
    fn test_destroy_is_terminal() {
        let mut sim = Simulation::new();
        let log = Log::default();
        let a = sim.schedule(SimDuration::from_secs(1), record(&log, "dropped")).unwrap();

        sim.destroy();
        assert_eq!(sim.state(), SimulationState::Destroyed);
        assert!(sim.is_finished());
        assert!(!sim.cancel(a));
        assert_eq!(sim.run(None), Err(SimError::Destroyed));
        assert_eq!(
            sim.schedule(SimDuration::ZERO, |_| Ok(())),
            Err(SimError::Destroyed)
        );
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_destroy_from_callback() {
        let mut sim = Simulation::new();
        let log = Log::default();
        sim.schedule(SimDuration::from_secs(1), |sim| {
            sim.destroy();
            Ok(())
        })
        .unwrap();
        sim.schedule(SimDuration::from_secs(2), record(&log, "never")).unwrap();

        assert_eq!(sim.run(None).unwrap(), 1);
        assert_eq!(sim.state(), SimulationState::Destroyed);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_step_by_step() {
        let mut sim = Simulation::new();
        sim.schedule(SimDuration::from_nanos(5), |_| Ok(())).unwrap();
        sim.schedule(SimDuration::from_nanos(15), |_| Ok(())).unwrap();

        let first = sim.step().unwrap().unwrap();
        assert_eq!(first.time, VirtualTime::new(5));
        assert_eq!(sim.now(), VirtualTime::new(5));

        let second = sim.step().unwrap().unwrap();
        assert_eq!(second.time, VirtualTime::new(15));
        assert!(sim.step().unwrap().is_none());
    }

    #[test]
    fn test_delay_left() {
        let mut sim = Simulation::new();
        let target = sim.schedule(SimDuration::from_secs(5), |_| Ok(())).unwrap();
        sim.schedule(SimDuration::from_secs(2), move |sim| {
            assert_eq!(sim.delay_left(target), Some(SimDuration::from_secs(3)));
            Ok(())
        })
        .unwrap();
        sim.run(None).unwrap();
        assert_eq!(sim.delay_left(target), None);
    }

    #[test]
    fn test_deterministic_replay() {
        fn run_trace() -> Vec<(u64, &'static str)> {
            let mut sim = Simulation::new();
            let log = Log::default();
            sim.schedule(SimDuration::from_nanos(5), record(&log, "alpha")).unwrap();
            sim.schedule(SimDuration::from_nanos(5), record(&log, "beta")).unwrap();
            sim.schedule(SimDuration::from_nanos(3), record(&log, "gamma")).unwrap();
            sim.schedule(SimDuration::from_nanos(10), record(&log, "delta")).unwrap();
            sim.run(None).unwrap();
            let trace = log.borrow().clone();
            trace
        }

        assert_eq!(run_trace(), run_trace(), "Simulation is not deterministic!");
    }
}
