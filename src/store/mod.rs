//! Span store abstraction.
//!
//! The query engine consumes two capabilities: "spans overlapping a
//! time range" and "spans by span/trace id". Any backend exposing those
//! satisfies the contract; [`InMemorySpanStore`] is the built-in one.

mod memory;

pub use memory::{InMemorySpanStore, StoreStats};

use crate::model::Span;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Coarse time scope handed to the store. Stores may over-return
/// (overlap semantics); the engine applies the exact bounds afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub finish: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, finish: Option<DateTime<Utc>>) -> Self {
        Self { start, finish }
    }

    /// Unbounded range matching every span
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether a span's lifetime overlaps this range
    pub fn overlaps(&self, span: &Span) -> bool {
        if let Some(start) = self.start {
            if span.finish_timestamp < start {
                return false;
            }
        }
        if let Some(finish) = self.finish {
            if span.start_timestamp > finish {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate span id: {0}")]
    DuplicateSpanId(String),

    #[error("span {0} finishes before it starts")]
    InvalidSpan(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Read capability the query engine consumes.
///
/// All methods are side-effect free; the store read is the engine's one
/// async boundary, so dropping an operation's future cancels it at the
/// store.
#[async_trait]
pub trait SpanStore: Send + Sync {
    /// All spans overlapping the range, with substructures populated.
    /// Output order is unspecified; the engine sorts.
    async fn spans_in_range(&self, range: TimeRange) -> Result<Vec<Span>, StoreError>;

    /// The span with the given id, if stored
    async fn span_by_id(&self, span_id: &str) -> Result<Option<Span>, StoreError>;

    /// All spans belonging to the given trace. Output order is
    /// unspecified.
    async fn spans_for_trace(&self, trace_id: &str) -> Result<Vec<Span>, StoreError>;
}
