//! Entities queried and returned by the trace query engine.
//!
//! The engine never mutates these; it reads spans from the store and
//! assembles read-only aggregates owned by the caller.

mod span;
mod trace;

pub use span::{Baggage, Log, LogField, Reference, ReferenceKind, Span, Tag};
pub use trace::{Trace, TraceHistogram, TraceOperationHistogram};
