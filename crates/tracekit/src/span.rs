// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span lifecycle.
//!
//! A [`Span`] is one timed unit of work. It has exactly two states:
//!
//! ```text
//! startSpan ──▶ Open ──finish()──▶ Finished
//! ```
//!
//! While open, tags, baggage, and log events can be added. `finish()`
//! transitions the span exactly once (further calls are no-ops, as are
//! mutations on a finished span) and hands an immutable [`FinishedSpan`]
//! snapshot to the reporter when the trace is sampled (or debug-flagged).
//! A span that is dropped without being finished is never reported.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use tracing::debug;

use crate::context::SpanContext;
use crate::reporter::Reporter;

/// One timestamped event recorded on a span.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: SystemTime,
    pub event: String,
}

/// Immutable snapshot of a span, produced by `finish()`.
#[derive(Clone, Debug, Serialize)]
pub struct FinishedSpan {
    pub context: SpanContext,
    pub operation_name: String,
    pub start_time: SystemTime,
    pub finish_time: SystemTime,
    pub tags: HashMap<String, String>,
    pub logs: Vec<LogRecord>,
}

/// A unit of work in progress.
///
/// Created by [`Tracer::start_span`](crate::tracer::Tracer::start_span);
/// owned by the code doing the work, not by the tracer.
pub struct Span {
    context: SpanContext,
    operation_name: String,
    start_time: SystemTime,
    tags: HashMap<String, String>,
    logs: Vec<LogRecord>,
    reporter: Arc<dyn Reporter>,
    finished: bool,
}

impl Span {
    pub(crate) fn new(
        context: SpanContext,
        operation_name: &str,
        tags: HashMap<String, String>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            context,
            operation_name: operation_name.to_string(),
            start_time: SystemTime::now(),
            tags,
            logs: Vec::new(),
            reporter,
            finished: false,
        }
    }

    #[must_use]
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_tag(&mut self, key: &str, value: impl Into<String>) {
        if self.guard_finished("set_tag") {
            return;
        }
        self.tags.insert(key.to_string(), value.into());
    }

    /// Adds a baggage entry to this span's context.
    ///
    /// Only this span's copy of the baggage changes; the parent's view is
    /// untouched. Keys are normalized to lowercase to survive
    /// case-insensitive transports.
    pub fn set_baggage_item(&mut self, key: &str, value: &str) {
        if self.guard_finished("set_baggage_item") {
            return;
        }
        self.context
            .baggage
            .insert(key.to_lowercase(), value.to_string());
    }

    #[must_use]
    pub fn baggage_item(&self, key: &str) -> Option<&str> {
        self.context.baggage_item(key)
    }

    pub fn log_event(&mut self, event: impl Into<String>) {
        if self.guard_finished("log_event") {
            return;
        }
        self.logs.push(LogRecord {
            timestamp: SystemTime::now(),
            event: event.into(),
        });
    }

    /// Finishes the span and reports it if the trace is sampled.
    ///
    /// Idempotent: only the first call snapshots and reports; later calls do
    /// nothing, so no span can be reported twice.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let span = FinishedSpan {
            context: self.context.clone(),
            operation_name: self.operation_name.clone(),
            start_time: self.start_time,
            finish_time: SystemTime::now(),
            tags: std::mem::take(&mut self.tags),
            logs: std::mem::take(&mut self.logs),
        };

        if span.context.sampling.sampled || span.context.sampling.debug {
            self.reporter.report(span);
        }
    }

    fn guard_finished(&self, operation: &str) -> bool {
        if self.finished {
            debug!("{operation} on a finished span is a no-op");
        }
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SamplingState;
    use crate::reporter::InMemoryReporter;

    fn sampled_context() -> SpanContext {
        SpanContext {
            trace_id: 1,
            span_id: 2,
            sampling: SamplingState {
                sampled: true,
                debug: false,
            },
            ..Default::default()
        }
    }

    fn make_span(context: SpanContext, reporter: &Arc<InMemoryReporter>) -> Span {
        Span::new(
            context,
            "test-operation",
            HashMap::new(),
            Arc::clone(reporter) as Arc<dyn Reporter>,
        )
    }

    #[test]
    fn test_finish_reports_once() {
        let reporter = Arc::new(InMemoryReporter::new());
        let mut span = make_span(sampled_context(), &reporter);

        span.finish();
        span.finish();
        span.finish();

        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn test_unsampled_span_is_not_reported() {
        let reporter = Arc::new(InMemoryReporter::new());
        let mut span = make_span(
            SpanContext {
                sampling: SamplingState::default(),
                ..sampled_context()
            },
            &reporter,
        );

        span.finish();

        assert!(reporter.is_empty());
    }

    #[test]
    fn test_debug_flag_forces_reporting() {
        let reporter = Arc::new(InMemoryReporter::new());
        let mut span = make_span(
            SpanContext {
                sampling: SamplingState {
                    sampled: false,
                    debug: true,
                },
                ..sampled_context()
            },
            &reporter,
        );

        span.finish();

        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn test_unfinished_span_is_never_reported() {
        let reporter = Arc::new(InMemoryReporter::new());
        {
            let _span = make_span(sampled_context(), &reporter);
        }
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_mutations_after_finish_are_noops() {
        let reporter = Arc::new(InMemoryReporter::new());
        let mut span = make_span(sampled_context(), &reporter);
        span.set_tag("kept", "yes");
        span.finish();

        span.set_tag("late", "no");
        span.set_baggage_item("late", "no");
        span.log_event("too late");

        let spans = reporter.spans();
        assert_eq!(spans[0].tags.get("kept").map(String::as_str), Some("yes"));
        assert!(!spans[0].tags.contains_key("late"));
        assert!(spans[0].logs.is_empty());
        assert!(!spans[0].context.baggage.contains_key("late"));
    }

    #[test]
    fn test_baggage_and_logs_are_captured() {
        let reporter = Arc::new(InMemoryReporter::new());
        let mut span = make_span(sampled_context(), &reporter);

        span.set_baggage_item("Crossdock-Baggage-Key", "Zoidberg");
        span.log_event("called downstream");
        assert_eq!(span.baggage_item("crossdock-baggage-key"), Some("Zoidberg"));

        span.finish();

        let spans = reporter.spans();
        assert_eq!(
            spans[0].context.baggage.get("crossdock-baggage-key"),
            Some(&"Zoidberg".to_string())
        );
        assert_eq!(spans[0].logs.len(), 1);
        assert_eq!(spans[0].logs[0].event, "called downstream");
    }
}
