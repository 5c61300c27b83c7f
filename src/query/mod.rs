pub mod engine;
pub mod params;
pub mod predicate;

pub use engine::SpanQueryEngine;
pub use params::{DependencyQuery, TraceQuery, DEFAULT_TRACE_LIMIT};
pub use predicate::{build_query_tags, SpanFilter, SERVICE_TAG_KEY};

use crate::store::StoreError;

/// Failure taxonomy for query operations. Not-found is not an error
/// (sentinel span / empty trace), and malformed tag-filter fragments
/// are dropped during predicate building rather than surfaced here.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Operation not implemented: {0}")]
    Unimplemented(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
