//! Timing-fork constraints: a three-signal contract `root -> a -> b` with a
//! minimum separation between the `a` and `b` edges.

use actsim_types::{Bit, GlobalOffset};

use crate::event_queue::VirtualTime;

/// Which transition on a signal counts as its "edge" for fork matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSelector {
    Rising,
    Falling,
    Either,
}

impl EdgeSelector {
    fn matches(self, old: Bit, new: Bit) -> bool {
        match self {
            EdgeSelector::Rising => old != Bit::One && new == Bit::One,
            EdgeSelector::Falling => old != Bit::Zero && new == Bit::Zero,
            EdgeSelector::Either => old != new,
        }
    }
}

/// The fork's state machine position, per §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkState {
    Inactive,
    Start,
    PendingDelay,
    Pending,
}

/// A single timing-fork monitor instance.
#[derive(Debug, Clone)]
pub struct TimingFork {
    pub name: String,
    pub root: GlobalOffset,
    pub a: GlobalOffset,
    pub b: GlobalOffset,
    pub margin: u64,
    pub root_edge: EdgeSelector,
    pub a_edge: EdgeSelector,
    pub b_edge: EdgeSelector,
    state: ForkState,
    a_time: VirtualTime,
    /// When set, the machine is quiescent and ignores all transitions.
    pub reset: bool,
}

/// Reported when the minimum root-to-a-to-b separation is violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkViolation {
    pub fork: String,
    pub margin: u64,
    pub actual: i64,
}

impl TimingFork {
    pub fn new(
        name: impl Into<String>,
        root: GlobalOffset,
        a: GlobalOffset,
        b: GlobalOffset,
        margin: u64,
        root_edge: EdgeSelector,
        a_edge: EdgeSelector,
        b_edge: EdgeSelector,
    ) -> Self {
        Self {
            name: name.into(),
            root,
            a,
            b,
            margin,
            root_edge,
            a_edge,
            b_edge,
            state: ForkState::Inactive,
            a_time: 0,
            reset: false,
        }
    }

    /// Feed a transition on `g` at time `at`. Returns a violation if the
    /// transition closes a fork whose `a`-to-`b` separation was too
    /// short, or if a second `a`-edge arrives while one is already
    /// pending.
    pub fn on_transition(
        &mut self,
        g: GlobalOffset,
        old: Bit,
        new: Bit,
        at: VirtualTime,
    ) -> Option<ForkViolation> {
        if self.reset {
            return None;
        }
        if g == self.root && self.root_edge.matches(old, new) {
            self.state = ForkState::Start;
            return None;
        }
        if g == self.a && self.a_edge.matches(old, new) {
            match self.state {
                ForkState::Start => {
                    self.state = ForkState::PendingDelay;
                    self.a_time = at;
                }
                ForkState::Pending | ForkState::PendingDelay => {
                    return Some(ForkViolation {
                        fork: self.name.clone(),
                        margin: self.margin,
                        actual: 0,
                    });
                }
                ForkState::Inactive => {}
            }
            return None;
        }
        if g == self.b && self.b_edge.matches(old, new) && self.state == ForkState::PendingDelay {
            let elapsed = at.saturating_sub(self.a_time) as i64;
            self.state = ForkState::Pending;
            if (elapsed as u64) < self.margin {
                return Some(ForkViolation {
                    fork: self.name.clone(),
                    margin: self.margin,
                    actual: elapsed,
                });
            }
            self.state = ForkState::Inactive;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fork() -> TimingFork {
        TimingFork::new(
            "f",
            GlobalOffset(0),
            GlobalOffset(1),
            GlobalOffset(2),
            10,
            EdgeSelector::Rising,
            EdgeSelector::Rising,
            EdgeSelector::Rising,
        )
    }

    #[test]
    fn separation_at_or_above_margin_is_clean() {
        let mut f = fork();
        assert!(f
            .on_transition(GlobalOffset(0), Bit::Zero, Bit::One, 0)
            .is_none());
        assert!(f
            .on_transition(GlobalOffset(1), Bit::Zero, Bit::One, 1)
            .is_none());
        assert!(f
            .on_transition(GlobalOffset(2), Bit::Zero, Bit::One, 11)
            .is_none());
    }

    #[test]
    fn separation_below_margin_violates() {
        let mut f = fork();
        f.on_transition(GlobalOffset(0), Bit::Zero, Bit::One, 0);
        f.on_transition(GlobalOffset(1), Bit::Zero, Bit::One, 1);
        let v = f.on_transition(GlobalOffset(2), Bit::Zero, Bit::One, 5);
        assert!(v.is_some());
        assert_eq!(v.unwrap().actual, 4);
    }

    #[test]
    fn reset_mode_is_quiescent() {
        let mut f = fork();
        f.reset = true;
        assert!(f
            .on_transition(GlobalOffset(0), Bit::Zero, Bit::One, 0)
            .is_none());
        assert!(f
            .on_transition(GlobalOffset(1), Bit::Zero, Bit::One, 1)
            .is_none());
        assert!(f
            .on_transition(GlobalOffset(2), Bit::Zero, Bit::One, 2)
            .is_none());
    }
}
