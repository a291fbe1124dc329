//! Stable numeric identifiers and the local/global offset scheme.
//!
//! The source simulator hashes raw connection pointers; here every
//! identity is a plain numeric id handed out by the elaboration layer
//! (see the "Reference to connection pointers as numeric IDs" design note).

use core::fmt;

/// A stable id for an elaborated connection (net/channel binding site).
/// Stands in for the source's use of pointer identity as a hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// A flat, non-negative index into one of the state vector's typed arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalOffset(pub u32);

impl fmt::Display for GlobalOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// The three ways an instance-relative offset can resolve, per §3 of the
/// specification: an instance-local slot, a port index to be looked up in
/// the instance's port-binding table, or an index into the global shared
/// partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOffset {
    /// `offset >= 0`: instance-local, add the instance's base.
    Local(u32),
    /// `offset` was negative and odd: `-(2k+1)` encodes port index `k`.
    Port(u32),
    /// `offset` was negative and even: `-2k` encodes global shared index `k`.
    Global(u32),
}

impl LocalOffset {
    /// Decode a signed local offset using the encoding from §3:
    /// non-negative is instance-local; negative odd is a port index;
    /// negative even is a global-shared index.
    pub fn decode(raw: i64) -> Self {
        if raw >= 0 {
            LocalOffset::Local(raw as u32)
        } else {
            let n = (-raw) as u32;
            if n % 2 == 1 {
                // -(2k+1) => k
                LocalOffset::Port((n - 1) / 2)
            } else {
                // -2k => k
                LocalOffset::Global(n / 2)
            }
        }
    }

    /// Re-encode back to the signed representation; the inverse of [`decode`](Self::decode).
    pub fn encode(self) -> i64 {
        match self {
            LocalOffset::Local(k) => k as i64,
            LocalOffset::Port(k) => -(2 * k as i64 + 1),
            LocalOffset::Global(k) => -(2 * k as i64),
        }
    }
}
