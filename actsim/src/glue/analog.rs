//! The analog bridge contract: outward DAC notifications on every
//! boundary boolean change, and inward ADC callbacks that write a
//! boolean into the state vector and trigger fanout, per §6.

use hashbrown::HashSet;

use actsim_types::GlobalOffset;

use crate::event_queue::VirtualTime;

/// One inward transition crossing the analog boundary: the device side
/// has resolved a node's voltage to a digital level and wants it folded
/// back into the boolean state vector at `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcEvent {
    pub var: GlobalOffset,
    pub value: bool,
    pub at: VirtualTime,
}

/// What a device-level back-end implements to participate in the
/// boundary: outward changes are pushed eagerly via `dac`, inward
/// changes are drained on demand via `poll_adc`.
pub trait AnalogBridge {
    fn dac(&mut self, var: GlobalOffset, value: bool, at: VirtualTime);
    fn poll_adc(&mut self) -> Vec<AdcEvent>;
    /// The latest time up to which the bridge has committed to not
    /// retroactively revise a previously delivered ADC event.
    fn confirmed_time(&self) -> VirtualTime;
}

/// Tracks which boolean cells in the state vector straddle the
/// digital/analog boundary, so the core knows which writes also need a
/// `dac` notification and which reads may originate from `poll_adc`
/// instead of ordinary propagation.
#[derive(Debug, Default)]
pub struct AnalogBoundary {
    bridged: HashSet<u32>,
}

impl AnalogBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_bridged(&mut self, var: GlobalOffset) {
        self.bridged.insert(var.0);
    }

    pub fn unmark_bridged(&mut self, var: GlobalOffset) {
        self.bridged.remove(&var.0);
    }

    pub fn is_bridged(&self, var: GlobalOffset) -> bool {
        self.bridged.contains(&var.0)
    }
}
