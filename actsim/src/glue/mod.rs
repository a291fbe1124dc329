//! Cross-level glue: adapting the channel fragment VM onto boolean state,
//! fanning trace events out to up to three parallel formats, and the
//! analog bridge contract described in §6.

pub mod analog;
pub mod fragment_install;
pub mod trace;

pub use analog::{AdcEvent, AnalogBoundary, AnalogBridge};
pub use fragment_install::{FragmentAdapter, FragmentHost};
pub use trace::{ChanEncoding, TraceFormatId, TraceHub, TraceNodeId, TraceSink, ValueEncoding};
