//! Query parameter model.
//!
//! Parameters are constructed per request, immutable once built, and
//! consumed by the engine.

use super::QueryError;
use crate::store::TimeRange;
use chrono::{DateTime, Duration, Utc};

/// Default number of traces returned by a search
pub const DEFAULT_TRACE_LIMIT: usize = 10;

/// Search parameters for trace search and histogram queries
#[derive(Debug, Clone)]
pub struct TraceQuery {
    /// Restrict to traces touching this service
    pub service_name: Option<String>,
    /// Pipe-separated `key=value` tag filter string; malformed
    /// fragments are dropped, not errors
    pub tags: Option<String>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub finish_timestamp: Option<DateTime<Utc>>,
    /// Trace-level duration lower bound (longest span in the trace)
    pub min_duration: Option<Duration>,
    /// Trace-level duration upper bound
    pub max_duration: Option<Duration>,
    /// Maximum number of traces returned; 0 yields an empty result
    pub limit: usize,
}

impl Default for TraceQuery {
    fn default() -> Self {
        Self {
            service_name: None,
            tags: None,
            start_timestamp: None,
            finish_timestamp: None,
            min_duration: None,
            max_duration: None,
            limit: DEFAULT_TRACE_LIMIT,
        }
    }
}

impl TraceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service_name = Some(service.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start_timestamp = Some(start);
        self
    }

    pub fn with_finish(mut self, finish: DateTime<Utc>) -> Self {
        self.finish_timestamp = Some(finish);
        self
    }

    pub fn between(self, start: DateTime<Utc>, finish: DateTime<Utc>) -> Self {
        self.with_start(start).with_finish(finish)
    }

    pub fn with_min_duration(mut self, min: Duration) -> Self {
        self.min_duration = Some(min);
        self
    }

    pub fn with_max_duration(mut self, max: Duration) -> Self {
        self.max_duration = Some(max);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Coarse range handed to the store
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_timestamp, self.finish_timestamp)
    }

    /// Normalization gate for the histogram path: both time bounds are
    /// required and must be ordered.
    pub fn ensure(&self) -> Result<(), QueryError> {
        let (start, finish) = match (self.start_timestamp, self.finish_timestamp) {
            (Some(start), Some(finish)) => (start, finish),
            _ => {
                return Err(QueryError::InvalidQuery(
                    "histogram queries require start and finish timestamps".into(),
                ))
            }
        };

        if start > finish {
            return Err(QueryError::InvalidQuery(format!(
                "start timestamp {} is after finish timestamp {}",
                start, finish
            )));
        }

        Ok(())
    }
}

/// Time scope for dependency span retrieval
#[derive(Debug, Clone, Default)]
pub struct DependencyQuery {
    pub start_timestamp: Option<DateTime<Utc>>,
    pub finish_timestamp: Option<DateTime<Utc>>,
}

impl DependencyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, start: DateTime<Utc>, finish: DateTime<Utc>) -> Self {
        self.start_timestamp = Some(start);
        self.finish_timestamp = Some(finish);
        self
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_timestamp, self.finish_timestamp)
    }
}
