//! A discrete-event simulator for asynchronous circuit descriptions
//! spanning four abstraction levels — CHP, HSE, PRS, and analog/device —
//! unified under one event queue and one global state vector.
//!
//! [`event_queue`] drives everything: a priority queue keyed on
//! `(virtual_time, sequence)` dispatches tags to whichever engine owns
//! the firing actor. [`chp`] interprets structured CHP/HSE programs
//! lowered to a DAG by [`chp::graph`]; [`prs`] evaluates production
//! rules with tri-state pull logic; [`channel`] implements the
//! rendezvous protocol shared by both, plus the fragmented-channel
//! step-by-step VM; [`state`] is the flat global state vector and its
//! fanout tables; [`hierarchy`] binds instance ports and resolves which
//! level each instance actually runs at; [`constraints`] checks
//! exclusivity and timing-fork invariants; [`glue`] adapts the fragment
//! VM onto live CHP state, fans trace events out to parallel formats,
//! and defines the analog bridge contract.

pub mod channel;
pub mod chp;
pub mod config;
pub mod constraints;
pub mod error;
pub mod event_queue;
pub mod glue;
pub mod hierarchy;
pub mod profiler;
pub mod prs;
pub mod simulator;
pub mod state;

pub use actsim_types::{Bit, ConnId, GlobalOffset, WideInt, WideIntError};
pub use config::SimConfig;
pub use error::{ElabResult, ElaborationError, SimFatal, SimResult, SimWarning, WarningResponse};
pub use event_queue::{Disposition, EventHandle, EventQueue, EventSink, VirtualTime};
pub use simulator::Simulator;
