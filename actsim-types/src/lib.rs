//! Atomic value and identifier types shared across the actsim simulation
//! core: the tri-state [`Bit`], the arbitrary-width [`WideInt`], and the
//! stable numeric ids used instead of pointer identity.

mod bit;
mod ids;
mod wideint;

pub use bit::Bit;
pub use ids::{ConnId, GlobalOffset, LocalOffset};
pub use wideint::{WideInt, WideIntError};
