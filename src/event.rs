/// Event records for the deterministic simulation kernel.
///
/// Every effect is modeled as an event: a callback bound to a virtual
/// time. The scheduler keeps the callbacks in an arena and orders small
/// `QueueEntry` keys in a min-heap, so handles stay valid no matter how
/// the heap reorganizes itself.

use std::cmp::Ordering;
use std::fmt;

use crate::error::SimResult;
use crate::simulation::Simulation;
use crate::time::VirtualTime;

/// A scheduled callback.
///
/// Receives the owning [`Simulation`] so it can read the clock and
/// schedule follow-up work. Returning an error aborts the current run.
pub type Callback = Box<dyn FnOnce(&mut Simulation) -> SimResult<()>>;

// ── Event ID ──────────────────────────────────────────────────────────

/// Handle to a scheduled event.
///
/// Indexes a slot in the scheduler's arena. The generation counter makes
/// handles to fired or cancelled events inert once the slot is reused,
/// so cancelling a stale handle can never hit an unrelated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    slot: u32,
    generation: u32,
}

impl EventId {
    #[inline]
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        EventId { slot, generation }
    }

    /// Arena slot index.
    #[inline]
    pub fn slot(self) -> u32 {
        self.slot
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}.{}", self.slot, self.generation)
    }
}

// ── Sequence Generator ────────────────────────────────────────────────

/// Strictly-increasing insertion counter.
///
/// Breaks ties between events scheduled for the same virtual time, which
/// yields FIFO order for simultaneous events.
#[derive(Debug, Clone, Default)]
pub struct SequenceGen {
    next: u64,
}

impl SequenceGen {
    pub fn new() -> Self {
        SequenceGen { next: 0 }
    }

    /// Mint the next sequence number.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next;
        self.next += 1;
        seq
    }

    /// Peek at the next sequence number without consuming it.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

// ── Queue Entry ───────────────────────────────────────────────────────

/// Heap key for one scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueEntry {
    pub(crate) scheduled_at: VirtualTime,
    pub(crate) seq: u64,
    pub(crate) id: EventId,
}

/// Ordering: smallest `(scheduled_at, seq)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// An event popped from the queue, ready for dispatch.
pub struct Event {
    pub id: EventId,
    pub seq: u64,
    pub scheduled_at: VirtualTime,
    pub callback: Callback,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .field("scheduled_at", &self.scheduled_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(at: u64, seq: u64) -> QueueEntry {
        QueueEntry {
            scheduled_at: VirtualTime::new(at),
            seq,
            id: EventId::new(seq as u32, 0),
        }
    }

    #[test]
    fn test_sequence_monotonic() {
        let mut gen = SequenceGen::new();
        let a = gen.next_seq();
        let b = gen.next_seq();
        assert_eq!((a, b), (0, 1));
        assert_eq!(gen.peek(), 2);
    }

    #[test]
    fn test_entry_ordering_by_time() {
        // Earlier time wins, so it compares greater in reversed ordering.
        assert!(entry(10, 1) > entry(20, 0));
    }

    #[test]
    fn test_entry_ordering_tiebreak_by_seq() {
        assert!(entry(10, 0) > entry(10, 1));
    }

    #[test]
    fn test_event_id_display() {
        assert_eq!(EventId::new(4, 2).to_string(), "E#4.2");
    }
}
