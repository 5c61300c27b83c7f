//! Predicate builder.
//!
//! Translates query parameters into the span-level time filters and the
//! trace-level tag-equality terms the engine applies after the coarse
//! store read.

use super::params::TraceQuery;
use crate::model::{Span, Tag};
use chrono::{DateTime, Utc};

/// Reserved tag key for the synthetic service-name term
pub const SERVICE_TAG_KEY: &str = "service";

/// A single span-level filter in the time-scope pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanFilter {
    StartsAtOrAfter(DateTime<Utc>),
    FinishesAtOrBefore(DateTime<Utc>),
}

impl SpanFilter {
    pub fn matches(&self, span: &Span) -> bool {
        match self {
            SpanFilter::StartsAtOrAfter(t) => span.start_timestamp >= *t,
            SpanFilter::FinishesAtOrBefore(t) => span.finish_timestamp <= *t,
        }
    }
}

/// Build the time-scope pipeline for the given bounds
pub fn scope_filters(
    start: Option<DateTime<Utc>>,
    finish: Option<DateTime<Utc>>,
) -> Vec<SpanFilter> {
    let mut filters = Vec::new();
    if let Some(start) = start {
        filters.push(SpanFilter::StartsAtOrAfter(start));
    }
    if let Some(finish) = finish {
        filters.push(SpanFilter::FinishesAtOrBefore(finish));
    }
    filters
}

/// Keep only the spans passing every filter
pub fn apply_filters(mut spans: Vec<Span>, filters: &[SpanFilter]) -> Vec<Span> {
    if filters.is_empty() {
        return spans;
    }
    spans.retain(|span| filters.iter().all(|f| f.matches(span)));
    spans
}

/// Materialize the ordered tag-equality terms for a trace search: the
/// synthetic service term first, then the `|`-separated `key=value`
/// candidates from the tag string, in input order. A candidate must
/// split on `=` into exactly two non-empty parts; anything else is
/// silently dropped.
pub fn build_query_tags(query: &TraceQuery) -> Vec<Tag> {
    let mut terms = Vec::new();

    if let Some(service) = query.service_name.as_deref() {
        if !service.is_empty() {
            terms.push(Tag::new(SERVICE_TAG_KEY, service));
        }
    }

    if let Some(tags) = query.tags.as_deref() {
        for candidate in tags.split('|') {
            let parts: Vec<&str> = candidate.split('=').collect();
            if let [key, value] = parts[..] {
                if !key.is_empty() && !value.is_empty() {
                    terms.push(Tag::new(key, value));
                }
            }
        }
    }

    terms
}

/// Whether a span satisfies one tag-equality term. The reserved
/// `service` key also matches the span's service-name field, since
/// stores may carry service as a field rather than a literal tag.
pub fn term_matches(span: &Span, term: &Tag) -> bool {
    if term.key == SERVICE_TAG_KEY && span.service_name == term.value {
        return true;
    }
    span.has_tag(&term.key, &term.value)
}
