/// Deterministic event queue.
///
/// Callbacks live in an arena of generation-tagged slots; a `BinaryHeap`
/// of `(scheduled_at, seq)` keys acts as a min-heap over them. Cancelling
/// only clears the slot. The stale heap key is discarded when it reaches
/// the top, which keeps cancellation O(1) and leaves every outstanding
/// handle valid.

use std::collections::BinaryHeap;

use crate::event::{Callback, Event, EventId, QueueEntry, SequenceGen};
use crate::time::VirtualTime;

enum SlotState {
    Vacant,
    Pending(Callback),
    Cancelled,
}

struct Slot {
    generation: u32,
    scheduled_at: VirtualTime,
    state: SlotState,
}

/// The core deterministic scheduler.
///
/// Owns the event arena, the heap of keys and the sequence generator.
/// All scheduling goes through this struct to keep sequence numbers
/// monotonic and ordering deterministic.
pub struct Scheduler {
    queue: BinaryHeap<QueueEntry>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    seq: SequenceGen,
    /// Events scheduled and neither fired nor cancelled.
    live: usize,
}

impl Scheduler {
    /// Create a new, empty scheduler.
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            seq: SequenceGen::new(),
            live: 0,
        }
    }

    /// Schedule `callback` at the absolute time `at`.
    pub fn schedule(&mut self, at: VirtualTime, callback: Callback) -> EventId {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    scheduled_at: at,
                    state: SlotState::Vacant,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let entry = &mut self.slots[slot as usize];
        entry.scheduled_at = at;
        entry.state = SlotState::Pending(callback);

        let id = EventId::new(slot, entry.generation);
        let seq = self.seq.next_seq();
        self.queue.push(QueueEntry {
            scheduled_at: at,
            seq,
            id,
        });
        self.live += 1;
        id
    }

    /// Mark the event cancelled. Returns `true` if it was still pending.
    ///
    /// Idempotent; handles to fired, cancelled or recycled events are
    /// ignored.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        if !matches!(slot.state, SlotState::Pending(_)) {
            return false;
        }
        slot.state = SlotState::Cancelled;
        self.live -= 1;
        true
    }

    /// Returns `true` if the event is scheduled and not yet fired or cancelled.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.slot(id)
            .is_some_and(|slot| matches!(slot.state, SlotState::Pending(_)))
    }

    /// Scheduled time of a pending event.
    pub fn scheduled_at(&self, id: EventId) -> Option<VirtualTime> {
        self.slot(id)
            .filter(|slot| matches!(slot.state, SlotState::Pending(_)))
            .map(|slot| slot.scheduled_at)
    }

    /// Time of the earliest live event, discarding cancelled keys on the way.
    pub fn peek_time(&mut self) -> Option<VirtualTime> {
        loop {
            let top = *self.queue.peek()?;
            if self.is_pending(top.id) {
                return Some(top.scheduled_at);
            }
            self.queue.pop();
            self.release(top.id);
        }
    }

    /// Pop the next live event (earliest time, lowest sequence number).
    ///
    /// Cancelled events are skipped silently. Returns `None` when no live
    /// event remains.
    pub fn pop_next(&mut self) -> Option<Event> {
        while let Some(top) = self.queue.pop() {
            let state = match self.slot_mut(top.id) {
                Some(slot) => std::mem::replace(&mut slot.state, SlotState::Vacant),
                None => continue,
            };
            self.release(top.id);
            if let SlotState::Pending(callback) = state {
                self.live -= 1;
                return Some(Event {
                    id: top.id,
                    seq: top.seq,
                    scheduled_at: top.scheduled_at,
                    callback,
                });
            }
        }
        None
    }

    /// Returns `true` if no live event remains.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of live (pending, uncancelled) events.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Sequence number the next scheduled event will receive.
    pub fn next_seq(&self) -> u64 {
        self.seq.peek()
    }

    /// Drop every event without running it.
    ///
    /// Generations are bumped so all outstanding handles go stale.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.state = SlotState::Vacant;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
        self.live = 0;
    }

    fn slot(&self, id: EventId) -> Option<&Slot> {
        self.slots
            .get(id.slot() as usize)
            .filter(|slot| slot.generation == id.generation())
    }

    fn slot_mut(&mut self, id: EventId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.slot() as usize)
            .filter(|slot| slot.generation == id.generation())
    }

    /// Return a slot to the free list once its heap key is gone.
    fn release(&mut self, id: EventId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.state = SlotState::Vacant;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.slot());
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("live", &self.live)
            .field("queued_keys", &self.queue.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}
