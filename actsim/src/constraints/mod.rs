//! Constraint checkers attached to boolean state: exclusivity (arbiter)
//! groups and timing-fork monitors.

pub mod exclusivity;
pub mod timing_fork;

pub use exclusivity::{Direction, ExclusivityTables, Policy};
pub use timing_fork::{EdgeSelector, ForkViolation, TimingFork};

/// All timing-fork monitors registered for a run; a flat vec since forks
/// are few relative to nets and each must see every relevant transition.
#[derive(Debug, Default)]
pub struct TimingForkTable {
    forks: Vec<TimingFork>,
}

impl TimingForkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fork: TimingFork) {
        self.forks.push(fork);
    }

    pub fn on_transition(
        &mut self,
        g: actsim_types::GlobalOffset,
        old: actsim_types::Bit,
        new: actsim_types::Bit,
        at: crate::event_queue::VirtualTime,
    ) -> Vec<ForkViolation> {
        self.forks
            .iter_mut()
            .filter_map(|f| f.on_transition(g, old, new, at))
            .collect()
    }
}
