//! In-memory span store

use super::{SpanStore, StoreError, TimeRange};
use crate::model::Span;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

/// In-memory store keeping every span keyed by span id, with a
/// trace-id index for fast trace reconstruction.
#[derive(Debug, Default)]
pub struct InMemorySpanStore {
    /// Spans indexed by span id
    spans: DashMap<String, Span>,
    /// Trace id -> span ids belonging to that trace, in insertion order
    traces: DashMap<String, Vec<String>>,
}

impl InMemorySpanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a span, enforcing the store invariants: unique span id
    /// and `finish_timestamp >= start_timestamp`.
    pub fn insert(&self, span: Span) -> Result<(), StoreError> {
        if span.finish_timestamp < span.start_timestamp {
            return Err(StoreError::InvalidSpan(span.span_id));
        }

        match self.spans.entry(span.span_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateSpanId(span.span_id)),
            Entry::Vacant(slot) => {
                self.traces
                    .entry(span.trace_id.clone())
                    .or_default()
                    .push(span.span_id.clone());
                slot.insert(span);
                Ok(())
            }
        }
    }

    /// Insert many spans, skipping any that fail validation
    pub fn insert_batch(&self, spans: Vec<Span>) -> usize {
        let mut inserted = 0;

        for span in spans {
            match self.insert(span) {
                Ok(()) => inserted += 1,
                Err(e) => {
                    tracing::warn!("Skipping span: {}", e);
                }
            }
        }

        inserted
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            span_count: self.spans.len(),
            trace_count: self.traces.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Point-in-time store cardinalities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub span_count: usize,
    pub trace_count: usize,
}

#[async_trait]
impl SpanStore for InMemorySpanStore {
    async fn spans_in_range(&self, range: TimeRange) -> Result<Vec<Span>, StoreError> {
        Ok(self
            .spans
            .iter()
            .filter(|entry| range.overlaps(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn span_by_id(&self, span_id: &str) -> Result<Option<Span>, StoreError> {
        Ok(self.spans.get(span_id).map(|entry| entry.value().clone()))
    }

    async fn spans_for_trace(&self, trace_id: &str) -> Result<Vec<Span>, StoreError> {
        let ids = match self.traces.get(trace_id) {
            Some(ids) => ids.value().clone(),
            None => return Ok(Vec::new()),
        };

        Ok(ids
            .iter()
            .filter_map(|id| self.spans.get(id).map(|entry| entry.value().clone()))
            .collect())
    }
}
