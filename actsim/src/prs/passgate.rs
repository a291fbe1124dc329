//! Pass transistors, transmission gates, and the multi-driver aggregation
//! node that combines them, per §4.8's pass-gate paragraph.

use actsim_types::{Bit, GlobalOffset};

/// `PASSN(g, s, d)` / `PASSP(g, s, d)`: an n-type or p-type pass
/// transistor gated by `g`, connecting source `s` to drain `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    PassN,
    PassP,
}

#[derive(Debug, Clone, Copy)]
pub struct PassGate {
    pub kind: PassKind,
    pub gate: GlobalOffset,
    pub source: GlobalOffset,
    pub drain: GlobalOffset,
}

impl PassGate {
    /// The value this transistor drives onto `drain`, or `None` if it is
    /// not currently conducting.
    pub fn driven_value(&self, get: impl Fn(GlobalOffset) -> Bit) -> Option<Bit> {
        let g = get(self.gate);
        let conducts = match (self.kind, g) {
            (PassKind::PassN, Bit::One) => true,
            (PassKind::PassP, Bit::Zero) => true,
            (_, Bit::X) => return Some(Bit::X),
            _ => false,
        };
        if conducts {
            Some(get(self.source))
        } else {
            None
        }
    }
}

/// `TGATE(g, _g, s, d)`: a CMOS transmission gate conducting when `g=1`
/// and `_g=0` (its complement).
#[derive(Debug, Clone, Copy)]
pub struct TransmissionGate {
    pub gate: GlobalOffset,
    pub gate_bar: GlobalOffset,
    pub source: GlobalOffset,
    pub drain: GlobalOffset,
}

impl TransmissionGate {
    pub fn driven_value(&self, get: impl Fn(GlobalOffset) -> Bit) -> Option<Bit> {
        let g = get(self.gate);
        let gb = get(self.gate_bar);
        if g == Bit::X || gb == Bit::X {
            return Some(Bit::X);
        }
        if g == Bit::One && gb == Bit::Zero {
            Some(get(self.source))
        } else {
            None
        }
    }
}

/// A node driven by more than one pass/transmission gate: aggregates the
/// set of currently-conducting contributions into a single effective
/// value and feeds `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiPrs {
    pub target: GlobalOffset,
}

impl MultiPrs {
    /// Combine the driven values of every contributing gate. No drivers
    /// conducting leaves the node floating (`X`, modeling charge-storage
    /// ambiguity at this level of detail); disagreeing drivers are a
    /// contention and resolve to `X`.
    pub fn combine(contributions: &[Bit]) -> Bit {
        let mut result: Option<Bit> = None;
        for &v in contributions {
            result = Some(match result {
                None => v,
                Some(prev) if prev == v => prev,
                Some(_) => Bit::X,
            });
        }
        result.unwrap_or(Bit::X)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passn_conducts_on_gate_high() {
        let g = PassGate {
            kind: PassKind::PassN,
            gate: GlobalOffset(0),
            source: GlobalOffset(1),
            drain: GlobalOffset(2),
        };
        let get = |off: GlobalOffset| match off.0 {
            0 => Bit::One,
            1 => Bit::Zero,
            _ => Bit::X,
        };
        assert_eq!(g.driven_value(get), Some(Bit::Zero));
    }

    #[test]
    fn passp_does_not_conduct_on_gate_high() {
        let g = PassGate {
            kind: PassKind::PassP,
            gate: GlobalOffset(0),
            source: GlobalOffset(1),
            drain: GlobalOffset(2),
        };
        let get = |off: GlobalOffset| match off.0 {
            0 => Bit::One,
            1 => Bit::Zero,
            _ => Bit::X,
        };
        assert_eq!(g.driven_value(get), None);
    }

    #[test]
    fn multiprs_agreeing_drivers_resolve_to_shared_value() {
        assert_eq!(MultiPrs::combine(&[Bit::One, Bit::One]), Bit::One);
    }

    #[test]
    fn multiprs_disagreeing_drivers_resolve_to_x() {
        assert_eq!(MultiPrs::combine(&[Bit::One, Bit::Zero]), Bit::X);
    }

    #[test]
    fn multiprs_no_drivers_floats_to_x() {
        assert_eq!(MultiPrs::combine(&[]), Bit::X);
    }
}
