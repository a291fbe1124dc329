//! The exclusivity (arbiter) constraint: groups of booleans that must
//! never simultaneously hold the same nonzero value.

use actsim_types::{Bit, GlobalOffset};
use hashbrown::HashMap;
use rand::Rng;

/// Which polarity a group guards: `Hi` groups forbid simultaneous `1`s,
/// `Lo` groups forbid simultaneous `0`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Hi,
    Lo,
}

impl Direction {
    fn matches(self, v: Bit) -> bool {
        matches!(
            (self, v),
            (Direction::Hi, Bit::One) | (Direction::Lo, Bit::Zero)
        )
    }

    fn opposite_value(self) -> Bit {
        match self {
            Direction::Hi => Bit::Zero,
            Direction::Lo => Bit::One,
        }
    }
}

#[derive(Debug, Clone)]
struct Group {
    name: String,
    members: Vec<u32>,
}

/// Whether an exclusivity constraint blocks the offending write
/// (`mk_excl*`) or merely reports it (`excl*`), per the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Enforce,
    Observe,
}

/// Per the §4.4 design: for each direction, a map from member global
/// offset to the groups it belongs to.
#[derive(Debug, Default)]
pub struct ExclusivityTables {
    hi_groups: HashMap<u32, Vec<usize>>,
    lo_groups: HashMap<u32, Vec<usize>>,
    groups: Vec<(Direction, Policy, Group)>,
    pub randomized_arbitration: bool,
}

/// What [`ExclusivityTables::safe_change`] decided, and which other
/// members (if any) had a pending event that must now be flushed because
/// they can no longer fire.
pub struct Decision {
    pub allowed: bool,
    pub flush: Vec<u32>,
    pub violation: Option<String>,
}

impl ExclusivityTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(
        &mut self,
        name: impl Into<String>,
        direction: Direction,
        policy: Policy,
        members: Vec<GlobalOffset>,
    ) {
        let idx = self.groups.len();
        let members: Vec<u32> = members.iter().map(|g| g.0).collect();
        for &m in &members {
            let map = match direction {
                Direction::Hi => &mut self.hi_groups,
                Direction::Lo => &mut self.lo_groups,
            };
            map.entry(m).or_default().push(idx);
        }
        self.groups.push((
            direction,
            policy,
            Group {
                name: name.into(),
                members,
            },
        ));
    }

    /// `safe_change(g, v)`: only called for `v ∈ {0,1}`. Looks at every
    /// group containing `g` whose direction matches `v`; if another
    /// member already holds `v` (rather than the required opposite
    /// value), the change is denied for an enforcing group, or reported
    /// as a violation for an observing one. Otherwise, every other
    /// member's pending event is scheduled to be flushed, since they can
    /// no longer fire.
    pub fn safe_change(
        &mut self,
        g: GlobalOffset,
        v: Bit,
        current: impl Fn(GlobalOffset) -> Bit,
    ) -> Decision {
        let Bit::Zero | Bit::One = v else {
            return Decision {
                allowed: true,
                flush: vec![],
                violation: None,
            };
        };
        let index_list = match v {
            Bit::One => self.hi_groups.get(&g.0),
            Bit::Zero => self.lo_groups.get(&g.0),
            Bit::X => unreachable!(),
        };
        let Some(indices) = index_list else {
            return Decision {
                allowed: true,
                flush: vec![],
                violation: None,
            };
        };
        let mut flush = Vec::new();
        let mut violation = None;
        let mut allowed = true;
        for &idx in indices {
            let (direction, policy, group) = &self.groups[idx];
            if !direction.matches(v) {
                continue;
            }
            let required = direction.opposite_value();
            let mut candidates = Vec::new();
            let mut broken = false;
            for &m in &group.members {
                if m == g.0 {
                    continue;
                }
                let cur = current(GlobalOffset(m));
                if cur != required {
                    // Anything but the exact opposite denies the change,
                    // including X: a member whose value isn't settled yet
                    // is not a license to proceed.
                    broken = true;
                } else {
                    candidates.push(m);
                }
            }
            if broken {
                match policy {
                    Policy::Enforce => allowed = false,
                    Policy::Observe => {
                        violation = Some(format!("mutex violation in group `{}`", group.name))
                    }
                }
                continue;
            }
            flush.extend(candidates);
        }
        Decision {
            allowed,
            flush,
            violation,
        }
    }

    /// When randomized arbitration is enabled and multiple members have a
    /// pending event toward the same value, pick one uniformly and deny
    /// the rest. `candidates` are offsets with a pending event toward `v`.
    pub fn arbitrate(&self, rng: &mut impl Rng, candidates: &[u32]) -> Option<u32> {
        if candidates.is_empty() {
            return None;
        }
        if !self.randomized_arbitration {
            return candidates.first().copied();
        }
        let i = rng.gen_range(0..candidates.len());
        Some(candidates[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforcing_group_denies_second_member_going_high_while_first_is_high() {
        let mut tbl = ExclusivityTables::new();
        let a = GlobalOffset(0);
        let b = GlobalOffset(1);
        tbl.add_group("g", Direction::Hi, Policy::Enforce, vec![a, b]);
        let state = |g: GlobalOffset| if g == a { Bit::One } else { Bit::X };
        let decision = tbl.safe_change(b, Bit::One, state);
        assert!(!decision.allowed);
    }

    #[test]
    fn observing_group_reports_violation_but_allows_the_write() {
        let mut tbl = ExclusivityTables::new();
        let a = GlobalOffset(0);
        let b = GlobalOffset(1);
        tbl.add_group("g", Direction::Hi, Policy::Observe, vec![a, b]);
        let state = |g: GlobalOffset| if g == a { Bit::One } else { Bit::X };
        let decision = tbl.safe_change(b, Bit::One, state);
        assert!(decision.allowed);
        assert!(decision.violation.is_some());
    }

    #[test]
    fn opposite_member_write_flushes_others_pending_events() {
        let mut tbl = ExclusivityTables::new();
        let a = GlobalOffset(0);
        let b = GlobalOffset(1);
        let c = GlobalOffset(2);
        tbl.add_group("g", Direction::Hi, Policy::Enforce, vec![a, b, c]);
        let state = |g: GlobalOffset| if g == b || g == c { Bit::Zero } else { Bit::X };
        let decision = tbl.safe_change(a, Bit::One, state);
        assert!(decision.allowed);
        assert_eq!(decision.flush.len(), 2);
    }
}
