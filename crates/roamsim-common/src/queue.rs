//! Event queue with deterministic ordering and cancellation.
//!
//! The queue owns the simulation clock. Events are ordered by:
//! 1. Time (earlier first)
//! 2. Ordinal (insertion order, FIFO among equal timestamps)
//!
//! Cancelled events stay in the heap and are discarded when they reach the
//! top, so cancellation is O(1) and firing a cancelled event is a no-op.

use crate::{EntityId, Event, EventId, EventPayload, SimError, SimTime};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Handle returned when an event is scheduled; used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    id: EventId,
    time: SimTime,
}

impl EventHandle {
    pub fn id(&self) -> EventId {
        self.id
    }

    /// When the event is (or was) due.
    pub fn time(&self) -> SimTime {
        self.time
    }
}

struct QueuedEvent(Event);

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.0.time == other.0.time && self.0.id == other.0.id
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest time, then lowest ordinal)
        other
            .0
            .time
            .cmp(&self.0.time)
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

/// Strictly time-ordered queue of future events plus the simulation clock.
pub struct EventQueue {
    now: SimTime,
    heap: BinaryHeap<QueuedEvent>,
    /// Ids scheduled but neither fired nor cancelled.
    pending: HashSet<EventId>,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            now: SimTime::ZERO,
            heap: BinaryHeap::new(),
            pending: HashSet::new(),
            next_id: 0,
        }
    }

    /// Current simulation time. Never decreases.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of live (not cancelled, not fired) events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Schedule `payload` for `targets` after `delay`.
    ///
    /// Delays are unsigned, so this cannot fail; negative delays coming from
    /// configuration are rejected earlier by [`SimTime::try_from_secs`].
    pub fn schedule(
        &mut self,
        source: EntityId,
        delay: SimTime,
        targets: Vec<EntityId>,
        payload: EventPayload,
    ) -> EventHandle {
        let time = self.now + delay;
        self.push(source, time, targets, payload)
    }

    /// Schedule `payload` at an absolute time, which must not be in the past.
    pub fn schedule_at(
        &mut self,
        source: EntityId,
        time: SimTime,
        targets: Vec<EntityId>,
        payload: EventPayload,
    ) -> Result<EventHandle, SimError> {
        if time < self.now {
            return Err(SimError::InvalidTime {
                requested: time,
                now: self.now,
            });
        }
        Ok(self.push(source, time, targets, payload))
    }

    fn push(
        &mut self,
        source: EntityId,
        time: SimTime,
        targets: Vec<EntityId>,
        payload: EventPayload,
    ) -> EventHandle {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.pending.insert(id);
        self.heap.push(QueuedEvent(Event {
            id,
            time,
            source,
            targets,
            payload,
        }));
        EventHandle { id, time }
    }

    /// Cancel a pending event. Returns `false` if it already fired or was
    /// already cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.pending.remove(&handle.id)
    }

    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.pending.contains(&handle.id)
    }

    /// Time of the next live event, discarding cancelled ones on the way.
    pub fn next_time(&mut self) -> Option<SimTime> {
        self.discard_cancelled();
        self.heap.peek().map(|e| e.0.time)
    }

    /// Pop the next live event due at or before `until`, advancing the clock
    /// to its timestamp.
    pub fn pop_due(&mut self, until: SimTime) -> Option<Event> {
        self.discard_cancelled();
        if self.heap.peek()?.0.time > until {
            return None;
        }
        let QueuedEvent(event) = self.heap.pop()?;
        self.pending.remove(&event.id);
        self.now = event.time;
        Some(event)
    }

    /// Move the clock forward to `time` (no-op if already past it).
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.0.id) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: EntityId = EntityId(0);

    fn timer(id: u64) -> EventPayload {
        EventPayload::Timer { timer_id: id }
    }

    fn timer_id(event: &Event) -> u64 {
        match event.payload {
            EventPayload::Timer { timer_id } => timer_id,
            _ => panic!("unexpected payload"),
        }
    }

    fn drain(queue: &mut EventQueue) -> Vec<(SimTime, u64)> {
        let mut out = Vec::new();
        while let Some(e) = queue.pop_due(SimTime::MAX) {
            out.push((e.time, timer_id(&e)));
        }
        out
    }

    #[test]
    fn test_events_pop_in_time_order() {
        let mut q = EventQueue::new();
        q.schedule(SRC, SimTime::from_millis(30), vec![], timer(3));
        q.schedule(SRC, SimTime::from_millis(10), vec![], timer(1));
        q.schedule(SRC, SimTime::from_millis(20), vec![], timer(2));

        let order: Vec<u64> = drain(&mut q).into_iter().map(|(_, id)| id).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(q.now(), SimTime::from_millis(30));
    }

    #[test]
    fn test_equal_timestamps_are_fifo() {
        let mut q = EventQueue::new();
        for id in 0..10 {
            q.schedule(SRC, SimTime::from_millis(5), vec![], timer(id));
        }
        let order: Vec<u64> = drain(&mut q).into_iter().map(|(_, id)| id).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_timestamps_never_decrease_with_reentrant_scheduling() {
        let mut q = EventQueue::new();
        q.schedule(SRC, SimTime::from_millis(1), vec![], timer(0));
        let mut seen = Vec::new();
        while let Some(e) = q.pop_due(SimTime::from_secs(1.0)) {
            seen.push(e.time);
            let n = timer_id(&e);
            if n < 20 {
                // Each action schedules two more: one now, one later.
                q.schedule(SRC, SimTime::ZERO, vec![], timer(n + 1));
                q.schedule(SRC, SimTime::from_millis(n % 7), vec![], timer(n + 2));
            }
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut q = EventQueue::new();
        let keep = q.schedule(SRC, SimTime::from_millis(10), vec![], timer(1));
        let drop = q.schedule(SRC, SimTime::from_millis(5), vec![], timer(2));
        assert_eq!(q.len(), 2);

        assert!(q.cancel(drop));
        assert!(!q.cancel(drop), "second cancel is a no-op");
        assert!(!q.is_pending(drop));
        assert!(q.is_pending(keep));
        assert_eq!(q.len(), 1);

        assert_eq!(drain(&mut q), vec![(SimTime::from_millis(10), 1)]);
        assert!(!q.cancel(keep), "cancelling a fired event is a no-op");
    }

    #[test]
    fn test_schedule_at_rejects_past() {
        let mut q = EventQueue::new();
        q.schedule(SRC, SimTime::from_millis(100), vec![], timer(0));
        q.pop_due(SimTime::MAX);

        let err = q
            .schedule_at(SRC, SimTime::from_millis(50), vec![], timer(1))
            .unwrap_err();
        assert_eq!(
            err,
            SimError::InvalidTime {
                requested: SimTime::from_millis(50),
                now: SimTime::from_millis(100),
            }
        );
        assert!(q
            .schedule_at(SRC, SimTime::from_millis(100), vec![], timer(2))
            .is_ok());
    }

    #[test]
    fn test_pop_due_respects_horizon() {
        let mut q = EventQueue::new();
        q.schedule(SRC, SimTime::from_secs(2.0), vec![], timer(0));
        assert!(q.pop_due(SimTime::from_secs(1.0)).is_none());
        assert_eq!(q.now(), SimTime::ZERO);
        q.advance_to(SimTime::from_secs(1.0));
        assert_eq!(q.next_time(), Some(SimTime::from_secs(2.0)));
        assert!(q.pop_due(SimTime::from_secs(2.0)).is_some());
    }
}
