//! Breakpoints and watchpoints on state-vector writes, interposed on the
//! `set_bool`/`set_int` hot paths the way the interpreter's own debugger
//! interposes on register writes.

use actsim_types::{Bit, GlobalOffset};
use hashbrown::HashSet;

/// What triggered a breakpoint-eligible write, reported back to whatever
/// front end is driving the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHit {
    pub cell: GlobalOffset,
    pub old: Bit,
    pub new: Bit,
}

/// Tracks boolean watchpoints and a global single-step/breakpoint mode.
/// Per-watchpoint output is further muted by format bitmask per the trace
/// format design (§6); this type only tracks which cells are watched and
/// whether a write should pause the run.
#[derive(Debug, Default)]
pub struct Debugger {
    watched: HashSet<u32>,
    /// When true, every boolean write anywhere returns a breakpoint
    /// disposition (single-step mode).
    single_step: bool,
    hits: Vec<WatchHit>,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, g: GlobalOffset) {
        self.watched.insert(g.0);
    }

    pub fn unwatch(&mut self, g: GlobalOffset) {
        self.watched.remove(&g.0);
    }

    pub fn set_single_step(&mut self, on: bool) {
        self.single_step = on;
    }

    pub fn is_watched(&self, g: GlobalOffset) -> bool {
        self.watched.contains(&g.0)
    }

    /// Called by the simulator after a boolean write lands. Returns `true`
    /// if the write should surface as a breakpoint.
    pub fn on_bool_write(&mut self, g: GlobalOffset, old: Bit, new: Bit) -> bool {
        if self.single_step || self.is_watched(g) {
            if old != new {
                self.hits.push(WatchHit { cell: g, old, new });
            }
            true
        } else {
            false
        }
    }

    pub fn drain_hits(&mut self) -> Vec<WatchHit> {
        std::mem::take(&mut self.hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwatched_write_does_not_trigger_a_breakpoint() {
        let mut dbg = Debugger::new();
        assert!(!dbg.on_bool_write(GlobalOffset(0), Bit::Zero, Bit::One));
    }

    #[test]
    fn watched_write_triggers_and_is_recorded() {
        let mut dbg = Debugger::new();
        dbg.watch(GlobalOffset(3));
        assert!(dbg.on_bool_write(GlobalOffset(3), Bit::Zero, Bit::One));
        let hits = dbg.drain_hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cell, GlobalOffset(3));
    }
}
