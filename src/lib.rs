//! Tracefly: distributed-tracing span store and query engine
//!
//! Answers read queries over previously ingested tracing data: single
//! span lookup, full trace reconstruction, trace search by time window,
//! tag predicates and service name with pagination, time-scoped span
//! retrieval for dependency derivation, and a minute-bucketed histogram
//! of trace arrival volume.
//!
//! # Features
//!
//! - **Trace search**: time window plus tag-equality conjunction,
//!   applied trace-wide (terms may be satisfied by different spans)
//! - **Pagination**: the limit bounds whole traces, never splits one
//! - **Histograms**: traces counted by earliest span start, truncated
//!   to the minute
//! - **Pluggable storage**: any backend implementing [`SpanStore`]
//!
//! # Example
//!
//! ```no_run
//! use tracefly::model::Span;
//! use tracefly::query::{SpanQueryEngine, TraceQuery};
//! use tracefly::store::InMemorySpanStore;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemorySpanStore::new();
//! store.insert(
//!     Span::new("trace-1", "span-1")
//!         .with_service("checkout")
//!         .with_operation("GET /cart")
//!         .with_tag("http.status_code", "200"),
//! )?;
//!
//! let engine = SpanQueryEngine::new(store);
//! let traces = engine
//!     .get_traces(&TraceQuery::new().with_service("checkout"))
//!     .await?;
//! println!("found {} traces", traces.len());
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod query;
pub mod store;

// Re-export commonly used types
pub use model::{Span, Tag, Trace, TraceHistogram};
pub use query::{DependencyQuery, QueryError, SpanQueryEngine, TraceQuery};
pub use store::{InMemorySpanStore, SpanStore, StoreError, TimeRange};
