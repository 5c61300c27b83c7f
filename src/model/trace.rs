//! Trace aggregates and histogram result rows

use super::span::Span;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The set of all spans sharing a trace identifier, representing one
/// end-to-end request. A search miss is represented as a trace with the
/// requested id and no spans, not as an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    #[serde(default)]
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            spans: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Earliest start timestamp across member spans
    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.spans.iter().map(|s| s.start_timestamp).min()
    }

    /// Trace-level duration: the longest individual span duration
    pub fn duration(&self) -> Option<Duration> {
        self.spans.iter().map(|s| s.duration()).max()
    }
}

/// Number of distinct traces whose earliest span started within one
/// minute-wide time bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHistogram {
    /// Bucket start, truncated to the minute
    pub time: DateTime<Utc>,
    pub count: usize,
}

/// Per-operation-name histogram row. Reserved extension point; the
/// engine does not produce these yet and the corresponding operation
/// fails as unimplemented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceOperationHistogram {
    pub operation_name: String,
    pub time: DateTime<Utc>,
    pub count: usize,
}
