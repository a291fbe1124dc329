//! The central event queue: a priority queue keyed on `(virtual_time,
//! sequence)` with FIFO tie-breaking, underneath both the CHP and PRS
//! engines.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Virtual simulation time. Non-decreasing, counted in abstract time units.
pub type VirtualTime = u64;

/// An opaque, stable handle to a scheduled event, returned by
/// [`EventQueue::new_event`] and accepted by [`EventQueue::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(u64);

/// What an actor's `step` reports back to the scheduler after handling one
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep draining the queue.
    Continue,
    /// A breakpoint or single-step condition was hit; the caller should
    /// pause and report before resuming.
    Breakpoint,
    /// Stop advancing entirely (e.g. a configured step/advance budget was
    /// exhausted, or a fatal error occurred).
    Stop,
}

/// An event target implements `step` to consume one event tag at a given
/// time. `Target` is whatever identifies the receiving actor to the
/// simulator driving the queue (an index, typically).
pub trait EventSink<Target, Tag> {
    /// Deliver one event to `target` carrying `tag`, fired at `at`.
    /// Returns the disposition for the scheduler to act on.
    fn deliver(&mut self, target: Target, tag: Tag, at: VirtualTime) -> Disposition;
}

#[derive(Debug, Clone)]
struct ScheduledEvent<Target, Tag> {
    time: VirtualTime,
    sequence: u64,
    handle: EventHandle,
    target: Target,
    tag: Tag,
}

impl<Target, Tag> PartialEq for ScheduledEvent<Target, Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}
impl<Target, Tag> Eq for ScheduledEvent<Target, Tag> {}

impl<Target, Tag> PartialOrd for ScheduledEvent<Target, Tag> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Target, Tag> Ord for ScheduledEvent<Target, Tag> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the earliest time (and, within a
        // tie, the earliest sequence number) to compare greatest so it pops
        // first.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue over virtual time. Generic over the target identity and
/// tag payload so the CHP interpreter (which tags with `(pc_slot, flag)`)
/// and the PRS engine (which tags with the scheduled boolean value) can
/// share one implementation.
pub struct EventQueue<Target, Tag> {
    heap: BinaryHeap<ScheduledEvent<Target, Tag>>,
    next_sequence: u64,
    next_handle: u64,
    now: VirtualTime,
    /// Handles that were cancelled before being popped; checked on pop so
    /// `remove` stays O(log n) without needing to touch the heap directly.
    cancelled: hashbrown::HashSet<EventHandle>,
}

impl<Target, Tag> Default for EventQueue<Target, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Target, Tag> EventQueue<Target, Tag> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
            next_handle: 0,
            now: 0,
            cancelled: hashbrown::HashSet::new(),
        }
    }

    /// Current virtual time: the time of the most recently delivered event,
    /// or zero before anything has run.
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.heap.iter().all(|e| self.cancelled.contains(&e.handle))
    }

    /// Schedule `tag` for `target`, `dt` virtual-time units from now.
    pub fn new_event(&mut self, target: Target, tag: Tag, dt: VirtualTime) -> EventHandle {
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            time: self.now + dt,
            sequence,
            handle,
            target,
            tag,
        });
        handle
    }

    /// Cancel a pending event. Guarantees the target's `step` will never be
    /// invoked for this handle. No-op if already fired or already
    /// cancelled.
    pub fn remove(&mut self, handle: EventHandle) {
        self.cancelled.insert(handle);
    }

    fn pop_next(&mut self) -> Option<ScheduledEvent<Target, Tag>> {
        while let Some(ev) = self.heap.pop() {
            if self.cancelled.remove(&ev.handle) {
                continue;
            }
            return Some(ev);
        }
        None
    }

    /// Peek at the next undelivered event's scheduled time, without
    /// removing it.
    pub fn peek_time(&mut self) -> Option<VirtualTime> {
        loop {
            match self.heap.peek() {
                Some(ev) if self.cancelled.contains(&ev.handle) => {
                    let ev = self.heap.pop().unwrap();
                    self.cancelled.remove(&ev.handle);
                }
                Some(ev) => return Some(ev.time),
                None => return None,
            }
        }
    }

    /// Dequeue and deliver events until the head time exceeds `t_target`,
    /// or a non-`Continue` disposition is returned.
    pub fn advance_until<S: EventSink<Target, Tag>>(
        &mut self,
        sink: &mut S,
        t_target: VirtualTime,
    ) -> Disposition {
        loop {
            match self.peek_time() {
                Some(t) if t <= t_target => {
                    let ev = self.pop_next().expect("peeked Some implies pop_next Some");
                    self.now = ev.time;
                    match sink.deliver(ev.target, ev.tag, ev.time) {
                        Disposition::Continue => continue,
                        other => return other,
                    }
                }
                _ => return Disposition::Continue,
            }
        }
    }

    /// Deliver at most `n` events.
    pub fn step<S: EventSink<Target, Tag>>(&mut self, sink: &mut S, n: usize) -> Disposition {
        for _ in 0..n {
            match self.pop_next() {
                Some(ev) => {
                    self.now = ev.time;
                    match sink.deliver(ev.target, ev.tag, ev.time) {
                        Disposition::Continue => continue,
                        other => return other,
                    }
                }
                None => return Disposition::Continue,
            }
        }
        Disposition::Continue
    }

    /// Drain the queue to quiescence.
    pub fn run_until_empty<S: EventSink<Target, Tag>>(&mut self, sink: &mut S) -> Disposition {
        loop {
            match self.pop_next() {
                Some(ev) => {
                    self.now = ev.time;
                    match sink.deliver(ev.target, ev.tag, ev.time) {
                        Disposition::Continue => continue,
                        other => return other,
                    }
                }
                None => return Disposition::Continue,
            }
        }
    }

    /// Scan pending (undelivered, uncancelled) events for one matching
    /// `predicate`, cancel it, and report whether one was found. Used by
    /// the CHP engine to discard a probe wake-up event once a competing
    /// send/recv fires first.
    pub fn match_pending(&mut self, mut predicate: impl FnMut(&Target, &Tag) -> bool) -> bool {
        let mut found = None;
        for ev in self.heap.iter() {
            if self.cancelled.contains(&ev.handle) {
                continue;
            }
            if predicate(&ev.target, &ev.tag) {
                found = Some(ev.handle);
                break;
            }
        }
        if let Some(h) = found {
            self.remove(h);
            true
        } else {
            false
        }
    }

    pub fn pending_len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        delivered: Vec<(u32, u32, VirtualTime)>,
    }

    impl EventSink<u32, u32> for RecordingSink {
        fn deliver(&mut self, target: u32, tag: u32, at: VirtualTime) -> Disposition {
            self.delivered.push((target, tag, at));
            Disposition::Continue
        }
    }

    #[test]
    fn fires_in_time_order_with_fifo_ties() {
        let mut q: EventQueue<u32, u32> = EventQueue::new();
        q.new_event(1, 100, 5);
        q.new_event(2, 200, 5); // same time as above, scheduled second
        q.new_event(3, 300, 1);
        let mut sink = RecordingSink { delivered: vec![] };
        q.run_until_empty(&mut sink);
        assert_eq!(
            sink.delivered,
            vec![(3, 300, 1), (1, 100, 5), (2, 200, 5)]
        );
    }

    #[test]
    fn cancelled_event_is_never_delivered() {
        let mut q: EventQueue<u32, u32> = EventQueue::new();
        let h = q.new_event(1, 100, 5);
        q.new_event(2, 200, 5);
        q.remove(h);
        let mut sink = RecordingSink { delivered: vec![] };
        q.run_until_empty(&mut sink);
        assert_eq!(sink.delivered, vec![(2, 200, 5)]);
    }

    #[test]
    fn advance_until_stops_at_target_time() {
        let mut q: EventQueue<u32, u32> = EventQueue::new();
        q.new_event(1, 1, 5);
        q.new_event(2, 2, 15);
        let mut sink = RecordingSink { delivered: vec![] };
        q.advance_until(&mut sink, 10);
        assert_eq!(sink.delivered, vec![(1, 1, 5)]);
        assert_eq!(q.now(), 5);
    }

    #[test]
    fn match_pending_cancels_the_matched_event_only() {
        let mut q: EventQueue<u32, u32> = EventQueue::new();
        q.new_event(1, 42, 5);
        q.new_event(2, 43, 5);
        assert!(q.match_pending(|_, tag| *tag == 42));
        assert!(!q.match_pending(|_, tag| *tag == 42));
        let mut sink = RecordingSink { delivered: vec![] };
        q.run_until_empty(&mut sink);
        assert_eq!(sink.delivered, vec![(2, 43, 5)]);
    }
}
