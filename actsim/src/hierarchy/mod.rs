//! Hierarchy wiring: binds port connections and computes fanout across
//! instance boundaries in two passes, and resolves which simulation level
//! each process instance actually runs at.

mod wiring;

pub use wiring::{
    wire_hierarchy, HierarchyError, InstanceSpec, PortBinding, SpecDirective, WiredActor,
    WiringResult,
};

/// The four circuit abstraction levels a process instance can be realized
/// at. Ordered from least to most detailed for the substitution fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum SimLevel {
    #[display(fmt = "chp")]
    Chp,
    #[display(fmt = "hse")]
    Hse,
    #[display(fmt = "prs")]
    Prs,
    #[display(fmt = "device")]
    Device,
}

impl SimLevel {
    /// Per the level-substitution fallback order: if the process lacks a
    /// `prs` description, try `hse`, then `chp`. `device` is never
    /// substituted for, and never substitutes for anything else.
    pub fn substitution_order(requested: SimLevel) -> &'static [SimLevel] {
        match requested {
            SimLevel::Prs => &[SimLevel::Prs, SimLevel::Hse, SimLevel::Chp],
            SimLevel::Hse => &[SimLevel::Hse, SimLevel::Chp],
            SimLevel::Chp => &[SimLevel::Chp],
            SimLevel::Device => &[SimLevel::Device],
        }
    }
}
