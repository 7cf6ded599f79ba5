// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span context: the state a trace needs to cross a process boundary.
//!
//! A [`SpanContext`] is the portable identity of one span inside a trace. It
//! is everything a downstream hop needs to continue the trace:
//!
//! - **Trace identity**: 128-bit trace id shared by every span in the trace,
//!   the 64-bit id of this span, and the parent span id (absent for roots).
//! - **Sampling state**: the keep/drop decision made once at the root and
//!   propagated unchanged to every descendant.
//! - **Baggage**: user key/value data carried with the trace across all hops.
//!
//! Contexts are copied, never shared: a child span clones its parent's
//! baggage, so baggage added on the child is invisible to the parent.

use std::collections::HashMap;

use serde::Serialize;

/// Sampling decision for a trace.
///
/// Fixed when the root span is created and immutable afterwards; children and
/// remote hops inherit it verbatim. `debug` forces reporting regardless of the
/// sampling decision and is carried as its own flag on the wire.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Serialize)]
pub struct SamplingState {
    /// Whether spans of this trace are handed to the reporter.
    pub sampled: bool,
    /// Debug override, reported even when `sampled` is false.
    pub debug: bool,
}

/// Portable identity and propagated state of one span.
#[derive(Clone, Default, Debug, PartialEq, Serialize)]
pub struct SpanContext {
    /// 128-bit identifier shared by all spans of one trace.
    pub trace_id: u128,
    /// 64-bit identifier of this span, unique within the trace.
    pub span_id: u64,
    /// Span id of the parent, `None` for a root span.
    pub parent_span_id: Option<u64>,
    /// Sampling decision inherited from the root.
    pub sampling: SamplingState,
    /// Trace-scoped user data, propagated by value to every descendant.
    pub baggage: HashMap<String, String>,
}

impl SpanContext {
    /// A context is propagatable only when both identifiers are set.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.trace_id != 0 && self.span_id != 0
    }

    #[must_use]
    pub fn baggage_item(&self, key: &str) -> Option<&str> {
        self.baggage.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Returns a copy of this context with one more baggage entry.
    ///
    /// Baggage keys are normalized to lowercase so they survive
    /// case-insensitive transports such as HTTP headers.
    #[must_use]
    pub fn with_baggage_item(mut self, key: &str, value: &str) -> Self {
        self.baggage.insert(key.to_lowercase(), value.to_string());
        self
    }

    /// Trace id as the fixed-width lowercase hex used on the wire.
    #[must_use]
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Span id as the fixed-width lowercase hex used on the wire.
    #[must_use]
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_is_not_valid() {
        assert!(!SpanContext::default().is_valid());

        let context = SpanContext {
            trace_id: 1,
            span_id: 2,
            ..Default::default()
        };
        assert!(context.is_valid());
    }

    #[test]
    fn test_baggage_is_copied_not_shared() {
        let parent = SpanContext {
            trace_id: 1,
            span_id: 2,
            ..Default::default()
        }
        .with_baggage_item("tenant", "acme");

        let child = parent.clone().with_baggage_item("request-id", "42");

        assert_eq!(child.baggage_item("tenant"), Some("acme"));
        assert_eq!(child.baggage_item("request-id"), Some("42"));
        assert_eq!(parent.baggage_item("request-id"), None);
    }

    #[test]
    fn test_baggage_keys_are_case_insensitive() {
        let context = SpanContext::default().with_baggage_item("Crossdock-Baggage-Key", "Zoidberg");

        assert_eq!(
            context.baggage_item("crossdock-baggage-key"),
            Some("Zoidberg")
        );
        assert_eq!(
            context.baggage_item("CROSSDOCK-BAGGAGE-KEY"),
            Some("Zoidberg")
        );
    }

    #[test]
    fn test_hex_rendering_is_fixed_width() {
        let context = SpanContext {
            trace_id: 0xbeef,
            span_id: 0xf00d,
            ..Default::default()
        };

        assert_eq!(
            context.trace_id_hex(),
            "0000000000000000000000000000beef"
        );
        assert_eq!(context.span_id_hex(), "000000000000f00d");
    }
}
