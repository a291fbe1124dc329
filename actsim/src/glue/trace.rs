//! Trace-event fan-out: up to three independently open formats, each
//! individually mutable per watchpoint, per §6.

use hashbrown::HashMap;

use crate::event_queue::VirtualTime;

/// Opaque identifier issued by a trace back-end at watchpoint
/// registration time. Distinct from a [`crate::hierarchy`] actor id or a
/// state-vector [`actsim_types::GlobalOffset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceNodeId(pub u32);

/// Boolean trace sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueEncoding {
    False,
    True,
    X,
}

/// Channel trace sentinel, carrying the wide-limb payload when a value
/// transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChanEncoding {
    Idle,
    SendBlocked,
    RecvBlocked,
    Value(Vec<u64>),
}

/// One registered trace back-end; implemented by whatever owns the
/// on-disk or in-memory trace format. The core only ever calls these.
pub trait TraceSink {
    fn digital_change(&mut self, node: TraceNodeId, time: VirtualTime, value: ValueEncoding);
    fn wide_digital_change(&mut self, node: TraceNodeId, time: VirtualTime, limbs: &[u64]);
    fn chan_change(&mut self, node: TraceNodeId, time: VirtualTime, state: &ChanEncoding);
    /// Parallel "alt-time" family, for back-ends whose native time base
    /// cannot represent a plain [`VirtualTime`] and need the big-int time
    /// as limbs instead.
    fn digital_change_alt(&mut self, node: TraceNodeId, time_limbs: &[u64], value: ValueEncoding);
    fn wide_digital_change_alt(&mut self, node: TraceNodeId, time_limbs: &[u64], limbs: &[u64]);
    fn chan_change_alt(&mut self, node: TraceNodeId, time_limbs: &[u64], state: &ChanEncoding);
}

/// Identifies one of the (at most three) simultaneously open trace
/// formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceFormatId(pub u8);

const MAX_FORMATS: usize = 3;

bitflags::bitflags! {
    /// Per-watchpoint mute mask: bit `i` mutes trace format `i` for that
    /// node.
    #[derive(Default)]
    struct MuteMask: u8 {
        const FORMAT_0 = 1 << 0;
        const FORMAT_1 = 1 << 1;
        const FORMAT_2 = 1 << 2;
    }
}

impl MuteMask {
    fn bit(format: TraceFormatId) -> Self {
        Self::from_bits_truncate(1 << format.0)
    }
}

/// Fans trace events out to every open format, honoring a per-watchpoint
/// mute mask.
#[derive(Default)]
pub struct TraceHub {
    sinks: [Option<Box<dyn TraceSink>>; MAX_FORMATS],
    muted: HashMap<u32, MuteMask>,
}

impl TraceHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, format: TraceFormatId, sink: Box<dyn TraceSink>) {
        if let Some(slot) = self.sinks.get_mut(format.0 as usize) {
            *slot = Some(sink);
        }
    }

    pub fn close(&mut self, format: TraceFormatId) {
        if let Some(slot) = self.sinks.get_mut(format.0 as usize) {
            *slot = None;
        }
    }

    pub fn set_muted(&mut self, node: TraceNodeId, format: TraceFormatId, muted: bool) {
        let entry = self.muted.entry(node.0).or_insert_with(MuteMask::empty);
        let bit = MuteMask::bit(format);
        if muted {
            entry.insert(bit);
        } else {
            entry.remove(bit);
        }
    }

    fn mask_for(&self, node: TraceNodeId) -> MuteMask {
        self.muted.get(&node.0).copied().unwrap_or(MuteMask::empty())
    }

    pub fn digital_change(&mut self, node: TraceNodeId, time: VirtualTime, value: ValueEncoding) {
        let mask = self.mask_for(node);
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if !mask.contains(MuteMask::bit(TraceFormatId(i as u8))) {
                if let Some(sink) = sink {
                    sink.digital_change(node, time, value);
                }
            }
        }
    }

    pub fn wide_digital_change(&mut self, node: TraceNodeId, time: VirtualTime, limbs: &[u64]) {
        let mask = self.mask_for(node);
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if !mask.contains(MuteMask::bit(TraceFormatId(i as u8))) {
                if let Some(sink) = sink {
                    sink.wide_digital_change(node, time, limbs);
                }
            }
        }
    }

    pub fn chan_change(&mut self, node: TraceNodeId, time: VirtualTime, state: &ChanEncoding) {
        let mask = self.mask_for(node);
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if !mask.contains(MuteMask::bit(TraceFormatId(i as u8))) {
                if let Some(sink) = sink {
                    sink.chan_change(node, time, state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingSink {
        digital: Rc<RefCell<Vec<(u32, VirtualTime, ValueEncoding)>>>,
    }

    impl TraceSink for RecordingSink {
        fn digital_change(&mut self, node: TraceNodeId, time: VirtualTime, value: ValueEncoding) {
            self.digital.borrow_mut().push((node.0, time, value));
        }
        fn wide_digital_change(&mut self, _node: TraceNodeId, _time: VirtualTime, _limbs: &[u64]) {}
        fn chan_change(&mut self, _node: TraceNodeId, _time: VirtualTime, _state: &ChanEncoding) {}
        fn digital_change_alt(&mut self, _node: TraceNodeId, _time_limbs: &[u64], _value: ValueEncoding) {}
        fn wide_digital_change_alt(&mut self, _node: TraceNodeId, _time_limbs: &[u64], _limbs: &[u64]) {}
        fn chan_change_alt(&mut self, _node: TraceNodeId, _time_limbs: &[u64], _state: &ChanEncoding) {}
    }

    #[test]
    fn open_format_receives_events_and_muted_watchpoint_is_silent() {
        let recorded = Rc::new(RefCell::new(Vec::new()));
        let mut hub = TraceHub::new();
        hub.open(TraceFormatId(0), Box::new(RecordingSink { digital: recorded.clone() }));

        hub.digital_change(TraceNodeId(1), 10, ValueEncoding::True);
        hub.set_muted(TraceNodeId(1), TraceFormatId(0), true);
        hub.digital_change(TraceNodeId(1), 20, ValueEncoding::False);
        hub.set_muted(TraceNodeId(1), TraceFormatId(0), false);
        hub.digital_change(TraceNodeId(1), 30, ValueEncoding::X);

        let seen = recorded.borrow();
        assert_eq!(
            seen.as_slice(),
            &[(1, 10, ValueEncoding::True), (1, 30, ValueEncoding::X)],
            "the muted write at t=20 must not reach the sink"
        );
    }

    #[test]
    fn muting_one_format_does_not_affect_another() {
        let a = Rc::new(RefCell::new(Vec::new()));
        let b = Rc::new(RefCell::new(Vec::new()));
        let mut hub = TraceHub::new();
        hub.open(TraceFormatId(0), Box::new(RecordingSink { digital: a.clone() }));
        hub.open(TraceFormatId(1), Box::new(RecordingSink { digital: b.clone() }));

        hub.set_muted(TraceNodeId(1), TraceFormatId(0), true);
        hub.digital_change(TraceNodeId(1), 5, ValueEncoding::True);

        assert!(a.borrow().is_empty());
        assert_eq!(b.borrow().len(), 1);
    }

    #[test]
    fn unopened_formats_are_silently_skipped() {
        let mut hub = TraceHub::new();
        // No sink open on any of the three slots; must not panic.
        hub.digital_change(TraceNodeId(0), 0, ValueEncoding::True);
        hub.chan_change(TraceNodeId(0), 0, &ChanEncoding::Idle);
    }
}
