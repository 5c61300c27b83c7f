//! Trace query engine.
//!
//! Executes the read operations against the span store: scope spans by
//! time, apply tag-term conjunction trace-wide, group flat spans into
//! traces, paginate, and quantize trace arrival volume into minute
//! buckets. All operations are read-only and may run concurrently; the
//! store read is the one async boundary, so dropping a future cancels
//! the operation there.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use fxhash::{FxHashMap, FxHashSet};

use super::params::{DependencyQuery, TraceQuery};
use super::predicate::{apply_filters, build_query_tags, scope_filters, term_matches};
use super::QueryError;
use crate::model::{Span, Tag, Trace, TraceHistogram, TraceOperationHistogram};
use crate::store::{SpanStore, TimeRange};

/// Read-only query engine over a span store
pub struct SpanQueryEngine<S> {
    store: S,
}

impl<S: SpanStore> SpanQueryEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Single-span lookup with tags, logs, references, and baggage
    /// populated. Returns the sentinel span (empty id) when nothing
    /// matches; callers check [`Span::is_sentinel`].
    pub async fn get_span(&self, span_id: &str) -> Result<Span, QueryError> {
        let span = self.store.span_by_id(span_id).await?;
        Ok(span.unwrap_or_default())
    }

    /// Full trace reconstruction, spans ascending by start timestamp.
    /// An unknown trace id yields a trace with the requested id and no
    /// spans, not an error.
    pub async fn get_trace(&self, trace_id: &str) -> Result<Trace, QueryError> {
        let mut spans = self.store.spans_for_trace(trace_id).await?;
        spans.sort_by(|a, b| {
            a.start_timestamp
                .cmp(&b.start_timestamp)
                .then_with(|| a.span_id.cmp(&b.span_id))
        });

        Ok(Trace {
            trace_id: trace_id.to_string(),
            spans,
        })
    }

    /// Trace search: time scoping, trace-wide tag-term conjunction,
    /// grouping by trace id with most recently started traces first,
    /// then truncation to `query.limit` traces. The limit bounds the
    /// number of traces, never splits one.
    pub async fn get_traces(&self, query: &TraceQuery) -> Result<Vec<Trace>, QueryError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut spans = self.scoped_spans(query.time_range()).await?;

        // Total order over the scoped set: descending start timestamp,
        // span id as tie-break. Groups inherit first-encounter order
        // from this, so the whole pipeline is deterministic.
        spans.sort_by(|a, b| {
            b.start_timestamp
                .cmp(&a.start_timestamp)
                .then_with(|| a.span_id.cmp(&b.span_id))
        });

        let terms = build_query_tags(query);
        if !terms.is_empty() {
            let matching = trace_ids_matching(&spans, &terms);
            spans.retain(|span| matching.contains(span.trace_id.as_str()));
        }

        let mut traces = group_by_trace(spans);

        if query.min_duration.is_some() || query.max_duration.is_some() {
            traces.retain(|t| duration_within(t, query.min_duration, query.max_duration));
        }

        traces.truncate(query.limit);

        tracing::debug!(
            "trace search returned {} traces (limit {})",
            traces.len(),
            query.limit
        );

        Ok(traces)
    }

    /// Time-scoped span set for dependency derivation, tags and
    /// references populated. No tag filtering and no grouping; the
    /// caller reduces span references into the service graph.
    pub async fn get_span_dependencies(
        &self,
        query: &DependencyQuery,
    ) -> Result<Vec<Span>, QueryError> {
        let mut spans = self.scoped_spans(query.time_range()).await?;
        spans.sort_by(|a, b| {
            a.start_timestamp
                .cmp(&b.start_timestamp)
                .then_with(|| a.span_id.cmp(&b.span_id))
        });
        Ok(spans)
    }

    /// Minute-bucketed count of traces by earliest span start. The
    /// query must normalize (both time bounds present and ordered); tag
    /// terms are not applied on this path. Buckets come back in
    /// chronological order.
    pub async fn get_trace_histogram(
        &self,
        query: &TraceQuery,
    ) -> Result<Vec<TraceHistogram>, QueryError> {
        query.ensure()?;

        let spans = self.scoped_spans(query.time_range()).await?;

        let mut earliest: FxHashMap<&str, DateTime<Utc>> = FxHashMap::default();
        for span in &spans {
            earliest
                .entry(span.trace_id.as_str())
                .and_modify(|t| *t = (*t).min(span.start_timestamp))
                .or_insert(span.start_timestamp);
        }

        let mut buckets: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
        for start in earliest.values() {
            *buckets.entry(minute_bucket(*start)).or_insert(0) += 1;
        }

        tracing::debug!(
            "histogram grouped {} traces into {} buckets",
            earliest.len(),
            buckets.len()
        );

        Ok(buckets
            .into_iter()
            .map(|(time, count)| TraceHistogram { time, count })
            .collect())
    }

    /// Per-operation-name histogram breakdown: reserved extension
    /// point, not implemented.
    pub async fn get_span_histogram_by_operation_name(
        &self,
        _query: &TraceQuery,
    ) -> Result<Vec<TraceOperationHistogram>, QueryError> {
        Err(QueryError::Unimplemented(
            "span histogram by operation name",
        ))
    }

    /// Coarse store read followed by the exact time-scope pipeline
    async fn scoped_spans(&self, range: TimeRange) -> Result<Vec<Span>, QueryError> {
        let spans = self.store.spans_in_range(range).await?;
        let filters = scope_filters(range.start, range.finish);
        Ok(apply_filters(spans, &filters))
    }
}

/// Trace ids for which every term is satisfied by at least one member
/// span of the scoped set. Terms need not be satisfied by the same
/// span.
fn trace_ids_matching(spans: &[Span], terms: &[Tag]) -> FxHashSet<String> {
    let mut satisfied: FxHashMap<&str, Vec<bool>> = FxHashMap::default();

    for span in spans {
        let seen = satisfied
            .entry(span.trace_id.as_str())
            .or_insert_with(|| vec![false; terms.len()]);
        for (i, term) in terms.iter().enumerate() {
            if !seen[i] && term_matches(span, term) {
                seen[i] = true;
            }
        }
    }

    satisfied
        .into_iter()
        .filter(|(_, seen)| seen.iter().all(|s| *s))
        .map(|(trace_id, _)| trace_id.to_string())
        .collect()
}

/// Group spans into traces in first-encounter order, keeping each
/// group's spans in input order
fn group_by_trace(spans: Vec<Span>) -> Vec<Trace> {
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    let mut traces: Vec<Trace> = Vec::new();

    for span in spans {
        match index.get(span.trace_id.as_str()) {
            Some(&i) => traces[i].spans.push(span),
            None => {
                index.insert(span.trace_id.clone(), traces.len());
                let mut trace = Trace::new(span.trace_id.clone());
                trace.spans.push(span);
                traces.push(trace);
            }
        }
    }

    traces
}

fn duration_within(trace: &Trace, min: Option<Duration>, max: Option<Duration>) -> bool {
    let duration = match trace.duration() {
        Some(d) => d,
        None => return false,
    };

    if let Some(min) = min {
        if duration < min {
            return false;
        }
    }
    if let Some(max) = max {
        if duration > max {
            return false;
        }
    }
    true
}

/// Truncate an instant to its minute, discarding seconds and
/// sub-second precision
fn minute_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - Duration::seconds(ts.timestamp().rem_euclid(60))
        - Duration::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReferenceKind;
    use crate::store::InMemorySpanStore;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn span(
        trace_id: &str,
        span_id: &str,
        start: DateTime<Utc>,
        duration_secs: i64,
        tags: &[(&str, &str)],
    ) -> Span {
        let mut span = Span::new(trace_id, span_id)
            .with_times(start, start + Duration::seconds(duration_secs));
        for (key, value) in tags {
            span = span.with_tag(*key, *value);
        }
        span
    }

    fn engine_with(spans: Vec<Span>) -> SpanQueryEngine<InMemorySpanStore> {
        let store = InMemorySpanStore::new();
        for span in spans {
            store.insert(span).unwrap();
        }
        SpanQueryEngine::new(store)
    }

    // Spans from the histogram/search scenario: T1 starts 10:00:05 and
    // 10:00:40 (svc=A), T2 starts 10:01:10 (svc=B).
    fn scenario_engine() -> SpanQueryEngine<InMemorySpanStore> {
        engine_with(vec![
            span("T1", "sp1", ts(10, 0, 5), 1, &[("svc", "A")]),
            span("T1", "sp2", ts(10, 0, 40), 1, &[("svc", "A")]),
            span("T2", "sp3", ts(10, 1, 10), 1, &[("svc", "B")]),
        ])
    }

    #[test]
    fn test_minute_bucket_truncation() {
        assert_eq!(minute_bucket(ts(10, 0, 5)), ts(10, 0, 0));
        assert_eq!(minute_bucket(ts(10, 0, 59)), ts(10, 0, 0));
        assert_eq!(minute_bucket(ts(10, 1, 0)), ts(10, 1, 0));
        assert_eq!(
            minute_bucket(ts(10, 2, 30) + Duration::microseconds(123)),
            ts(10, 2, 0)
        );
    }

    #[tokio::test]
    async fn test_get_span_returns_stored_span() {
        let engine = scenario_engine();
        assert_eq!(engine.store().stats().span_count, 3);

        let span = engine.get_span("sp1").await.unwrap();
        assert_eq!(span.span_id, "sp1");
        assert_eq!(span.trace_id, "T1");
        assert!(span.has_tag("svc", "A"));
    }

    #[tokio::test]
    async fn test_get_span_missing_returns_sentinel() {
        let engine = scenario_engine();
        let span = engine.get_span("missing-id").await.unwrap();
        assert!(span.is_sentinel());
    }

    #[tokio::test]
    async fn test_get_trace_orders_spans_ascending() {
        let engine = scenario_engine();
        let trace = engine.get_trace("T1").await.unwrap();

        assert_eq!(trace.trace_id, "T1");
        let ids: Vec<&str> = trace.spans.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(ids, vec!["sp1", "sp2"]);
        assert!(trace
            .spans
            .windows(2)
            .all(|w| w[0].start_timestamp <= w[1].start_timestamp));
    }

    #[tokio::test]
    async fn test_get_trace_unknown_id_yields_empty_trace() {
        let engine = scenario_engine();
        let trace = engine.get_trace("nope").await.unwrap();
        assert_eq!(trace.trace_id, "nope");
        assert!(trace.is_empty());
    }

    #[tokio::test]
    async fn test_get_traces_most_recent_first() {
        let engine = scenario_engine();
        let traces = engine.get_traces(&TraceQuery::new()).await.unwrap();

        let ids: Vec<&str> = traces.iter().map(|t| t.trace_id.as_str()).collect();
        // T2 contains the most recently started span
        assert_eq!(ids, vec!["T2", "T1"]);
        // Each trace carries all of its scoped spans
        assert_eq!(traces[1].spans.len(), 2);
    }

    #[tokio::test]
    async fn test_get_traces_limit_bounds_traces_not_spans() {
        let engine = scenario_engine();
        let traces = engine
            .get_traces(&TraceQuery::new().with_limit(1))
            .await
            .unwrap();

        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "T2");

        // A multi-span trace is never split across the limit boundary
        let traces = engine
            .get_traces(&TraceQuery::new().with_tags("svc=A").with_limit(1))
            .await
            .unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "T1");
        assert_eq!(traces[0].spans.len(), 2);
    }

    #[tokio::test]
    async fn test_get_traces_zero_limit_is_empty() {
        let engine = scenario_engine();
        let traces = engine
            .get_traces(&TraceQuery::new().with_limit(0))
            .await
            .unwrap();
        assert!(traces.is_empty());
    }

    #[tokio::test]
    async fn test_get_traces_default_limit_is_ten() {
        let mut spans = Vec::new();
        for i in 0..12 {
            spans.push(span(
                &format!("trace-{i:02}"),
                &format!("span-{i:02}"),
                ts(10, 0, i),
                1,
                &[],
            ));
        }
        let engine = engine_with(spans);

        let traces = engine.get_traces(&TraceQuery::new()).await.unwrap();
        assert_eq!(traces.len(), 10);
        // The two oldest traces fall off
        assert_eq!(traces[0].trace_id, "trace-11");
        assert_eq!(traces[9].trace_id, "trace-02");
    }

    #[tokio::test]
    async fn test_get_traces_tag_conjunction_is_trace_wide() {
        // No single span carries both tags, but the trace does
        let engine = engine_with(vec![
            span("T1", "a", ts(10, 0, 0), 1, &[("http.method", "GET")]),
            span("T1", "b", ts(10, 0, 1), 1, &[("error", "true")]),
            span("T2", "c", ts(10, 0, 2), 1, &[("http.method", "GET")]),
        ]);

        let query = TraceQuery::new().with_tags("http.method=GET|error=true");
        let traces = engine.get_traces(&query).await.unwrap();

        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "T1");
        assert_eq!(traces[0].spans.len(), 2);
    }

    #[tokio::test]
    async fn test_get_traces_malformed_tag_terms_are_ignored() {
        let engine = scenario_engine();
        let query = TraceQuery::new().with_tags("foo|a=b=c|=bar|svc=A");
        let traces = engine.get_traces(&query).await.unwrap();

        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "T1");
    }

    #[tokio::test]
    async fn test_get_traces_service_name_matches_field() {
        let engine = engine_with(vec![
            span("T1", "s1", ts(10, 0, 0), 1, &[]).with_service("checkout"),
            span("T2", "s2", ts(10, 0, 1), 1, &[]).with_service("billing"),
        ]);

        let traces = engine
            .get_traces(&TraceQuery::new().with_service("checkout"))
            .await
            .unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "T1");
    }

    #[tokio::test]
    async fn test_get_traces_time_scope() {
        let engine = scenario_engine();
        let query = TraceQuery::new().between(ts(10, 1, 0), ts(10, 2, 0));
        let traces = engine.get_traces(&query).await.unwrap();

        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "T2");
    }

    #[tokio::test]
    async fn test_get_traces_duration_bounds_are_trace_level() {
        let engine = engine_with(vec![
            span("fast", "f1", ts(10, 0, 0), 1, &[]),
            span("slow", "s1", ts(10, 0, 0), 1, &[]),
            span("slow", "s2", ts(10, 0, 1), 30, &[]),
        ]);

        // The slow trace qualifies through its longest span
        let traces = engine
            .get_traces(&TraceQuery::new().with_min_duration(Duration::seconds(10)))
            .await
            .unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "slow");

        let traces = engine
            .get_traces(&TraceQuery::new().with_max_duration(Duration::seconds(10)))
            .await
            .unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "fast");
    }

    #[tokio::test]
    async fn test_get_span_dependencies_time_scoped_ungrouped() {
        let engine = engine_with(vec![
            span("T1", "parent", ts(10, 0, 0), 1, &[]),
            span("T1", "child", ts(10, 0, 1), 1, &[])
                .with_reference(ReferenceKind::ChildOf, "parent"),
            span("T2", "outside", ts(11, 0, 0), 1, &[]),
        ]);

        let query = DependencyQuery::new().between(ts(10, 0, 0), ts(10, 30, 0));
        let spans = engine.get_span_dependencies(&query).await.unwrap();

        let ids: Vec<&str> = spans.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(ids, vec!["parent", "child"]);
        assert_eq!(spans[1].references[0].span_id, "parent");
        assert_eq!(spans[1].references[0].kind, ReferenceKind::ChildOf);
    }

    #[tokio::test]
    async fn test_histogram_scenario_two_buckets() {
        let engine = scenario_engine();
        let query = TraceQuery::new().between(ts(10, 0, 0), ts(10, 2, 0));
        let histogram = engine.get_trace_histogram(&query).await.unwrap();

        assert_eq!(
            histogram,
            vec![
                TraceHistogram {
                    time: ts(10, 0, 0),
                    count: 1
                },
                TraceHistogram {
                    time: ts(10, 1, 0),
                    count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_histogram_counts_sum_to_distinct_traces() {
        let mut spans = Vec::new();
        for i in 0..7 {
            // Traces alternate between the 10:00 and 10:03 minutes,
            // each with a second span that must not double-count
            let start = ts(10, (i % 2) * 3, i);
            spans.push(span(&format!("t{i}"), &format!("a{i}"), start, 1, &[]));
            spans.push(span(
                &format!("t{i}"),
                &format!("b{i}"),
                start + Duration::seconds(10),
                1,
                &[],
            ));
        }
        let engine = engine_with(spans);

        let query = TraceQuery::new().between(ts(10, 0, 0), ts(10, 10, 0));
        let histogram = engine.get_trace_histogram(&query).await.unwrap();

        let total: usize = histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, 7);
        assert_eq!(histogram.len(), 2);
        // Chronological bucket order
        assert!(histogram.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[tokio::test]
    async fn test_histogram_uses_earliest_span_start() {
        // The trace's later span sits in the next minute; only the
        // earliest start decides the bucket
        let engine = engine_with(vec![
            span("T1", "s1", ts(10, 0, 59), 1, &[]),
            span("T1", "s2", ts(10, 1, 30), 1, &[]),
        ]);

        let query = TraceQuery::new().between(ts(10, 0, 0), ts(10, 5, 0));
        let histogram = engine.get_trace_histogram(&query).await.unwrap();

        assert_eq!(
            histogram,
            vec![TraceHistogram {
                time: ts(10, 0, 0),
                count: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_histogram_ignores_tag_filters() {
        let engine = scenario_engine();
        let query = TraceQuery::new()
            .with_tags("svc=A")
            .between(ts(10, 0, 0), ts(10, 2, 0));
        let histogram = engine.get_trace_histogram(&query).await.unwrap();

        // Both traces counted despite the tag filter
        let total: usize = histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_histogram_requires_normalized_query() {
        let engine = scenario_engine();

        let err = engine
            .get_trace_histogram(&TraceQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));

        let err = engine
            .get_trace_histogram(&TraceQuery::new().between(ts(11, 0, 0), ts(10, 0, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_operation_name_histogram_is_unimplemented() {
        let engine = scenario_engine();
        let err = engine
            .get_span_histogram_by_operation_name(&TraceQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Unimplemented(_)));
    }
}
