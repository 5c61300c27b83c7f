//! Span data model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Causal relationship kind between two spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    ChildOf,
    FollowsFrom,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::ChildOf => "CHILD_OF",
            ReferenceKind::FollowsFrom => "FOLLOWS_FROM",
        }
    }
}

/// A key/value annotation on a span, used both as stored data and as a
/// query predicate term. Matching is exact-string equality on both
/// sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A key/value payload entry inside a log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogField {
    pub key: String,
    pub value: String,
}

impl LogField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A timestamped log record attached to a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields: Vec<LogField>,
}

/// A causal link from this span to another span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    /// Span id of the referenced span
    pub span_id: String,
}

/// Baggage item propagated alongside a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baggage {
    pub key: String,
    pub value: String,
}

/// A single timed operation within a distributed trace.
///
/// `Span::default()` doubles as the not-found sentinel: lookups that
/// match nothing return it instead of an error, and callers check
/// [`Span::is_sentinel`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Unique span id within the store (empty in the sentinel)
    pub span_id: String,
    /// Id of the trace this span belongs to
    pub trace_id: String,
    pub operation_name: String,
    pub service_name: String,
    pub start_timestamp: DateTime<Utc>,
    /// Always at or after `start_timestamp`
    pub finish_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub baggage: Vec<Baggage>,
}

impl Span {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: trace_id.into(),
            ..Default::default()
        }
    }

    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        self.operation_name = name.into();
        self
    }

    pub fn with_service(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_times(mut self, start: DateTime<Utc>, finish: DateTime<Utc>) -> Self {
        self.start_timestamp = start;
        self.finish_timestamp = finish;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    pub fn with_log(mut self, log: Log) -> Self {
        self.logs.push(log);
        self
    }

    pub fn with_reference(mut self, kind: ReferenceKind, span_id: impl Into<String>) -> Self {
        self.references.push(Reference {
            kind,
            span_id: span_id.into(),
        });
        self
    }

    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.push(Baggage {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Whether this is the empty not-found sentinel
    pub fn is_sentinel(&self) -> bool {
        self.span_id.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.finish_timestamp - self.start_timestamp
    }

    /// Exact-string tag lookup
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags.iter().any(|t| t.key == key && t.value == value)
    }
}
