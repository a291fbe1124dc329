//! The three-tier error taxonomy from the error handling design section:
//! fatal elaboration errors (abort before simulation starts), runtime-fatal
//! errors (halt the run in progress), and runtime-semantic warnings
//! (reported through the trace sink, response configurable).

use actsim_types::{ConnId, GlobalOffset, WideIntError};
use thiserror::Error;

/// Errors that abort elaboration before a single event is ever scheduled.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ElaborationError {
    /// A process instance has no state-vector information recorded for it.
    #[display(fmt = "missing state information for instance `{instance}`")]
    MissingStateInformation { instance: String },
    /// The statement tree uses a construct this engine doesn't lower.
    #[display(fmt = "unsupported construct in `{process}`: {detail}")]
    UnsupportedConstruct { process: String, detail: String },
    /// The requested simulation level isn't available and couldn't be
    /// substituted (device-level is never substitutable).
    #[display(
        fmt = "instance `{instance}` requested level {requested:?} which is unavailable and not substitutable"
    )]
    LevelMismatch {
        instance: String,
        requested: crate::hierarchy::SimLevel,
    },
    /// The source design contains a dataflow-language instance. The
    /// reference implementation silently skips these with a warning; per
    /// the spec's open question, this engine treats that ambiguity as
    /// unimplemented rather than guessing silent-ignore was intended.
    #[display(fmt = "dataflow-language instance `{instance}` is not implemented")]
    DataflowUnimplemented { instance: String },
}

impl std::error::Error for ElaborationError {}

pub type ElabResult<T> = Result<T, ElaborationError>;

/// Errors that halt an in-progress simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimFatal {
    /// A second party attempted a blocking send/recv on a channel that
    /// already has a committed (non-probe) party of the same side waiting.
    #[error("concurrent access to channel {chan}: a {side} is already posted")]
    ConcurrentChannelAccess { chan: ConnId, side: ChannelSide },
    /// An array reference resolved to an out-of-range linearized offset.
    #[error("array index {index} out of bounds for length {len}")]
    ArrayIndexOutOfBounds { index: i64, len: usize },
    /// A `+`/`-` half-action channel did not alternate flavors correctly.
    #[error("channel {chan} flavor discipline violated")]
    FlavorViolation { chan: ConnId },
    /// A `goto` referenced a label that doesn't exist in the graph.
    #[error("unknown goto target `{label}`")]
    UnknownGotoTarget { label: String },
    /// A user function call's argument types don't match its declaration.
    #[error("type mismatch calling function `{function}`")]
    FunctionTypeMismatch { function: String },
    /// An external function symbol referenced by a CHP body wasn't found.
    #[error("missing external function `{name}`")]
    MissingExternalFunction { name: String },
    /// `self`/`self.ack` evaluated outside a fragment method's body.
    #[error("self/self.ack used outside a fragment method")]
    SelfUsedOutsideFragment,
    /// Propagated from a wide-integer operation (e.g. division by zero).
    #[error(transparent)]
    WideInt(#[from] WideIntError),
}

pub type SimResult<T> = Result<T, SimFatal>;

/// Which side of a channel rendezvous a [`SimFatal::ConcurrentChannelAccess`]
/// refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ChannelSide {
    #[display(fmt = "sender")]
    Sender,
    #[display(fmt = "receiver")]
    Receiver,
}

/// Runtime-semantic warnings: reported, but do not by themselves stop the
/// simulation unless [`WarningResponse::Break`] or [`WarningResponse::Exit`]
/// is configured for the run.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SimWarning {
    /// Two active pull-up (or pull-down) rules disagree on the next value
    /// of a node, and a pending event to a third value had to be cancelled.
    #[display(fmt = "unstable rule on {node}")]
    Unstable { node: GlobalOffset },
    /// `up == 1 && down == 1` on the same gate evaluation.
    #[display(fmt = "interference on {node}")]
    Interference { node: GlobalOffset },
    /// `up == X && down == X` (both sides driven weak-unknown).
    #[display(fmt = "weak interference on {node}")]
    WeakInterference { node: GlobalOffset },
    /// Like [`Unstable`](Self::Unstable), but the conflicting rule was a
    /// weak rule.
    #[display(fmt = "weak-unstable rule on {node}")]
    WeakUnstable { node: GlobalOffset },
    /// An enum-typed assignment received a value outside its declared range.
    #[display(
        fmt = "enum value {value} out of range for {variable} (size {size})"
    )]
    EnumOutOfRange {
        variable: GlobalOffset,
        value: String,
        size: u32,
    },
    /// A narrower assignment target dropped significant bits of the value.
    #[display(
        fmt = "value needs {value_bits} bits but target {variable} is {target_width} bits wide"
    )]
    WidthMismatch {
        variable: GlobalOffset,
        target_width: u32,
        value_bits: u32,
    },
    /// A boolean expression read a variable that is currently `X`.
    #[display(fmt = "read of {variable} observed X")]
    BooleanReadIsX { variable: GlobalOffset },
    /// More than one guard evaluated true in a deterministic (`COND`)
    /// selection.
    #[display(fmt = "multiple guards true in deterministic selection in `{process}`")]
    MultiGuardTrue { process: String },
    /// Both the send and receive fragment VMs are simultaneously active on
    /// the same channel.
    #[display(fmt = "fragmented send and recv both active on channel {chan}")]
    FragmentedSendRecvSameChannel { chan: ConnId },
    /// An observing exclusivity monitor found its invariant already broken.
    #[display(fmt = "mutex violation in exclusivity group `{group}`")]
    MutexViolation { group: String },
    /// A timing-fork constraint's minimum separation was violated.
    #[display(
        fmt = "timing fork `{fork}` violated: margin {margin}, actual separation {actual}"
    )]
    TimingForkViolation {
        fork: String,
        margin: u64,
        actual: i64,
    },
    /// An asymmetric-fragmentation channel's reset method suspended rather
    /// than completing during `runInit`.
    #[display(fmt = "failed to initialize fragmented channel {chan}")]
    FragmentedChannelInitFailed { chan: ConnId },
    /// `runInit`'s bounded quiescence loop hit its iteration cap with
    /// events still pending.
    #[display(fmt = "pending production rule events during reset phase")]
    PendingEventsDuringReset,
}

impl std::error::Error for SimWarning {}

/// How the simulator should react when a [`SimWarning`] is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarningResponse {
    /// Log the warning and keep running.
    #[default]
    Continue,
    /// Log the warning and return a breakpoint disposition to the caller.
    Break,
    /// Log the warning and terminate the run as if it were fatal.
    Exit,
}
