//! The production-rule engine: one actor per gate, evaluating up/down
//! pull expressions with weak-logic tri-state semantics.

mod expr;
mod passgate;

pub use expr::{PrsExpr, PullStrength};
pub use passgate::{MultiPrs, PassGate, PassKind, TransmissionGate};

use actsim_types::{Bit, GlobalOffset};

use crate::error::SimWarning;
use crate::event_queue::VirtualTime;

/// A pending scheduled value for a gate's output, per §4.8's "at most one
/// pending event per node" invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub value: Bit,
    pub due: VirtualTime,
}

/// One PRS gate: four pull expressions (normal/weak for up and down), an
/// output node, per-gate delay, and its current pending event (if any).
#[derive(Debug, Clone)]
pub struct PrsGate {
    pub output: GlobalOffset,
    pub up_normal: PrsExpr,
    pub up_weak: PrsExpr,
    pub dn_normal: PrsExpr,
    pub dn_weak: PrsExpr,
    pub delay: u64,
    pending: Option<Pending>,
}

/// What [`PrsGate::propagate`] decided: a concrete schedule request, a
/// cancellation of the previous pending event in favor of a new one (an
/// instability), or nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    None,
    /// Schedule `value` at `delay` from now; no previous pending event to
    /// cancel.
    Schedule { value: Bit, delay: u64 },
    /// Cancel the previous pending event and schedule `X` after a unit
    /// delay: an instability.
    Unstable { forced_delay: u64 },
    /// No state change, but a pending event already targets this value;
    /// nothing new to schedule.
    AlreadyPending,
}

impl PrsGate {
    pub fn new(
        output: GlobalOffset,
        up_normal: PrsExpr,
        up_weak: PrsExpr,
        dn_normal: PrsExpr,
        dn_weak: PrsExpr,
        delay: u64,
    ) -> Self {
        Self {
            output,
            up_normal,
            up_weak,
            dn_normal,
            dn_weak,
            delay,
            pending: None,
        }
    }

    fn eval_side(normal: &PrsExpr, weak: &PrsExpr, get: &impl Fn(GlobalOffset) -> Bit) -> Bit {
        let u = normal.eval(get);
        if u == Bit::Zero {
            weak.eval(get)
        } else {
            u
        }
    }

    /// Recompute `u`/`d` from a fanout notification and decide what (if
    /// anything) should be scheduled, per the §4.8 truth table. Returns
    /// the action plus any warning that should be reported.
    pub fn propagate(
        &mut self,
        get: impl Fn(GlobalOffset) -> Bit,
        now: VirtualTime,
    ) -> (ScheduleAction, Option<SimWarning>) {
        let u = Self::eval_side(&self.up_normal, &self.up_weak, &get);
        let d = Self::eval_side(&self.dn_normal, &self.dn_weak, &get);
        let (target, warning) = match (u, d) {
            (Bit::Zero, Bit::Zero) => return (ScheduleAction::None, None),
            (Bit::Zero, _) => (Bit::Zero, None),
            (Bit::One, Bit::Zero) => (Bit::One, None),
            (Bit::One, Bit::One) => (Bit::X, Some(SimWarning::Interference { node: self.output })),
            (Bit::One, Bit::X) => (Bit::One, None),
            (Bit::X, Bit::Zero) => (Bit::One, None),
            (Bit::X, Bit::One) => (Bit::Zero, None),
            (Bit::X, Bit::X) => (
                Bit::X,
                Some(SimWarning::WeakInterference { node: self.output }),
            ),
        };
        let _ = now;
        match self.pending {
            Some(p) if p.value == target => (ScheduleAction::AlreadyPending, warning),
            Some(_) => {
                let unstable_warning = if warning.is_some() {
                    warning
                } else if target == Bit::X {
                    Some(SimWarning::WeakUnstable { node: self.output })
                } else {
                    Some(SimWarning::Unstable { node: self.output })
                };
                (ScheduleAction::Unstable { forced_delay: 1 }, unstable_warning)
            }
            None => (
                ScheduleAction::Schedule {
                    value: target,
                    delay: self.delay,
                },
                warning,
            ),
        }
    }

    pub fn set_pending(&mut self, value: Bit, due: VirtualTime) {
        self.pending = Some(Pending { value, due });
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<Pending> {
        self.pending
    }

    /// `step`: fire the pending event if its value still matches `v`;
    /// later unrelated events targeting a different value are ignored.
    pub fn fire(&mut self, v: Bit) -> bool {
        match self.pending {
            Some(p) if p.value == v => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expr::PrsExpr as E;
    use rstest::rstest;

    fn gate(up: E, dn: E) -> PrsGate {
        PrsGate::new(GlobalOffset(0), up, E::False, dn, E::False, 10)
    }

    #[test]
    fn both_zero_is_no_change() {
        let mut g = gate(E::False, E::False);
        let (action, warn) = g.propagate(|_| Bit::Zero, 0);
        assert_eq!(action, ScheduleAction::None);
        assert!(warn.is_none());
    }

    #[test]
    fn interference_schedules_x_with_warning() {
        let mut g = gate(E::True, E::True);
        let (action, warn) = g.propagate(|_| Bit::Zero, 0);
        assert_eq!(
            action,
            ScheduleAction::Schedule {
                value: Bit::X,
                delay: 10
            }
        );
        assert!(matches!(warn, Some(SimWarning::Interference { .. })));
    }

    #[test]
    fn repeated_same_target_is_already_pending() {
        let mut g = gate(E::True, E::False);
        let (action, _) = g.propagate(|_| Bit::Zero, 0);
        assert_eq!(
            action,
            ScheduleAction::Schedule {
                value: Bit::One,
                delay: 10
            }
        );
        g.set_pending(Bit::One, 10);
        let (action2, _) = g.propagate(|_| Bit::Zero, 0);
        assert_eq!(action2, ScheduleAction::AlreadyPending);
    }

    #[test]
    fn conflicting_pending_is_unstable() {
        let mut g = gate(E::True, E::False);
        g.set_pending(Bit::Zero, 5);
        let (action, warn) = g.propagate(|_| Bit::Zero, 0);
        assert_eq!(action, ScheduleAction::Unstable { forced_delay: 1 });
        assert!(matches!(warn, Some(SimWarning::Unstable { .. })));
    }

    /// Every non-(0,0) `(u, d)` combination, checked against a fresh gate
    /// (no prior pending event) so each case exercises `propagate`'s target
    /// selection in isolation from the pending/unstable bookkeeping above.
    #[rstest]
    #[case(Bit::Zero, Bit::One, Bit::Zero, false)]
    #[case(Bit::One, Bit::Zero, Bit::One, false)]
    #[case(Bit::One, Bit::One, Bit::X, true)]
    #[case(Bit::One, Bit::X, Bit::One, false)]
    #[case(Bit::X, Bit::Zero, Bit::One, false)]
    #[case(Bit::X, Bit::One, Bit::Zero, false)]
    #[case(Bit::X, Bit::X, Bit::X, true)]
    fn truth_table_selects_expected_target(
        #[case] u: Bit,
        #[case] d: Bit,
        #[case] expected: Bit,
        #[case] warns: bool,
    ) {
        let up = if u == Bit::X {
            E::Var(GlobalOffset(1))
        } else if u == Bit::One {
            E::True
        } else {
            E::False
        };
        let dn = if d == Bit::X {
            E::Var(GlobalOffset(1))
        } else if d == Bit::One {
            E::True
        } else {
            E::False
        };
        let mut g = gate(up, dn);
        let (action, warn) = g.propagate(|offset| if offset == GlobalOffset(1) { Bit::X } else { Bit::Zero }, 0);
        assert_eq!(
            action,
            ScheduleAction::Schedule {
                value: expected,
                delay: 10
            }
        );
        assert_eq!(warn.is_some(), warns);
    }
}
