//! Tri-state boolean logic shared by the PRS and CHP engines.

use core::fmt;

/// A single boolean cell value: driven low, driven high, or unknown.
///
/// `X` is the reset/undriven state and also the result of interference
/// between conflicting drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Bit {
    Zero,
    One,
    #[default]
    X,
}

impl Bit {
    pub const fn is_known(self) -> bool {
        !matches!(self, Bit::X)
    }

    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Bit::Zero => Some(false),
            Bit::One => Some(true),
            Bit::X => None,
        }
    }

    pub const fn not(self) -> Bit {
        match self {
            Bit::Zero => Bit::One,
            Bit::One => Bit::Zero,
            Bit::X => Bit::X,
        }
    }

    /// Weak-logic AND table: `X` only dominates when it cannot be resolved
    /// by a `0` on the other input.
    pub const fn and(self, other: Bit) -> Bit {
        match (self, other) {
            (Bit::Zero, _) | (_, Bit::Zero) => Bit::Zero,
            (Bit::One, Bit::One) => Bit::One,
            _ => Bit::X,
        }
    }

    /// Weak-logic OR table.
    pub const fn or(self, other: Bit) -> Bit {
        match (self, other) {
            (Bit::One, _) | (_, Bit::One) => Bit::One,
            (Bit::Zero, Bit::Zero) => Bit::Zero,
            _ => Bit::X,
        }
    }
}

impl From<bool> for Bit {
    fn from(v: bool) -> Self {
        if v {
            Bit::One
        } else {
            Bit::Zero
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bit::Zero => write!(f, "0"),
            Bit::One => write!(f, "1"),
            Bit::X => write!(f, "X"),
        }
    }
}
