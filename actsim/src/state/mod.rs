//! The global state vector: typed flat arrays for booleans, wide integers,
//! and channels, plus the fanout tables that drive propagation.

pub mod debugger;
pub mod fanout;

use actsim_types::{Bit, GlobalOffset, WideInt};
use fanout::{ActorId, FanoutTable};
use hashbrown::HashSet;

use crate::channel::ChanState;

/// A structured (record) value: an ordered sequence of leaf wide integers
/// plus the field widths needed to re-project sub-fields, per the
/// multi-value payload design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiValue {
    pub leaves: Vec<WideInt>,
}

impl MultiValue {
    pub fn scalar(v: WideInt) -> Self {
        MultiValue { leaves: vec![v] }
    }

    pub fn field(&self, index: usize) -> Option<&WideInt> {
        self.leaves.get(index)
    }
}

/// Which cell kind a [`GlobalOffset`] addresses, for fanout bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Bool,
    Int,
}

/// The simulator's single mutable store of circuit state. Owns booleans,
/// wide integers, and channels by dense index, plus per-kind fanout
/// tables. Only the simulator's `set_*` wrappers are expected to mutate
/// cells that affect propagation; this type exposes both a "raw" write
/// (no exclusivity/timing/propagation) and the bookkeeping the simulator
/// layers on top of it.
#[derive(Debug, Default)]
pub struct StateVector {
    bools: Vec<Bit>,
    ints: Vec<WideInt>,
    chans: Vec<ChanState>,
    bool_fanout: FanoutTable,
    int_fanout: FanoutTable,
    /// Boolean cells subject to exclusivity checking ("special" in the
    /// set_bool contract).
    special: HashSet<u32>,
}

impl StateVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_bools(&mut self, count: usize) -> GlobalOffset {
        let base = self.bools.len() as u32;
        self.bools.resize(self.bools.len() + count, Bit::X);
        GlobalOffset(base)
    }

    pub fn alloc_ints(&mut self, count: usize, width: u32) -> GlobalOffset {
        let base = self.ints.len() as u32;
        let fill = WideInt::unknown(width.max(1)).expect("width is clamped to at least 1");
        self.ints
            .resize(self.ints.len() + count, fill);
        GlobalOffset(base)
    }

    pub fn alloc_chan(&mut self, chan: ChanState) -> GlobalOffset {
        let idx = self.chans.len() as u32;
        self.chans.push(chan);
        GlobalOffset(idx)
    }

    pub fn mark_special(&mut self, g: GlobalOffset) {
        self.special.insert(g.0);
    }

    pub fn is_special(&self, g: GlobalOffset) -> bool {
        self.special.contains(&g.0)
    }

    pub fn get_bool(&self, g: GlobalOffset) -> Bit {
        self.bools[g.0 as usize]
    }

    /// Store a boolean without exclusivity checking, timing monitors, or
    /// fanout notification. Used by [`crate::simulator::Simulator::set_bool`],
    /// which layers the full contract on top.
    pub fn set_bool_raw(&mut self, g: GlobalOffset, v: Bit) {
        self.bools[g.0 as usize] = v;
    }

    pub fn get_int(&self, g: GlobalOffset) -> &WideInt {
        &self.ints[g.0 as usize]
    }

    pub fn set_int_raw(&mut self, g: GlobalOffset, v: WideInt) {
        self.ints[g.0 as usize] = v;
    }

    pub fn get_chan(&self, g: GlobalOffset) -> &ChanState {
        &self.chans[g.0 as usize]
    }

    pub fn get_chan_mut(&mut self, g: GlobalOffset) -> &mut ChanState {
        &mut self.chans[g.0 as usize]
    }

    /// Idempotent fanout registration (see [`fanout::FanoutTable::register`]).
    pub fn inc_fanout(&mut self, g: GlobalOffset, kind: CellKind, actor: ActorId) {
        match kind {
            CellKind::Bool => self.bool_fanout.register(g.0, actor),
            CellKind::Int => self.int_fanout.register(g.0, actor),
        }
    }

    pub fn fanout(&self, g: GlobalOffset, kind: CellKind) -> &[ActorId] {
        match kind {
            CellKind::Bool => self.bool_fanout.fanout(g.0),
            CellKind::Int => self.int_fanout.fanout(g.0),
        }
    }

    pub fn bool_count(&self) -> usize {
        self.bools.len()
    }

    pub fn int_count(&self) -> usize {
        self.ints.len()
    }

    pub fn chan_count(&self) -> usize {
        self.chans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bool_raw_idempotence_does_not_touch_other_cells() {
        let mut sv = StateVector::new();
        let base = sv.alloc_bools(3);
        sv.set_bool_raw(GlobalOffset(base.0 + 1), Bit::One);
        let before = sv.get_bool(GlobalOffset(base.0));
        sv.set_bool_raw(GlobalOffset(base.0 + 1), sv.get_bool(GlobalOffset(base.0 + 1)));
        assert_eq!(sv.get_bool(GlobalOffset(base.0)), before);
        assert_eq!(sv.get_bool(GlobalOffset(base.0 + 1)), Bit::One);
    }

    #[test]
    fn fanout_registration_is_per_kind() {
        let mut sv = StateVector::new();
        let g = sv.alloc_bools(1);
        sv.inc_fanout(g, CellKind::Bool, ActorId(7));
        assert_eq!(sv.fanout(g, CellKind::Bool), &[ActorId(7)]);
        assert!(sv.fanout(GlobalOffset(g.0), CellKind::Int).is_empty());
    }
}
