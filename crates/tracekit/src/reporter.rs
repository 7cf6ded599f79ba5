// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sinks for finished spans.
//!
//! The tracer hands every reportable finished span to a [`Reporter`].
//! Reporters must tolerate concurrent `report` calls from any number of
//! in-flight traces without losing or corrupting records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::span::FinishedSpan;

/// Sink for finished spans.
pub trait Reporter: Send + Sync {
    /// Accepts one finished span. Must be safe to call concurrently.
    fn report(&self, span: FinishedSpan);

    /// Flushes and releases the sink. Reports after `close` are dropped.
    fn close(&self) {}
}

/// Append-only in-memory sink, the test-side reporter.
#[derive(Default)]
pub struct InMemoryReporter {
    spans: Mutex<Vec<FinishedSpan>>,
    closed: AtomicBool,
}

impl InMemoryReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    #[must_use]
    pub fn spans(&self) -> Vec<FinishedSpan> {
        match self.spans.lock() {
            Ok(spans) => spans.clone(),
            Err(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.lock().map(|spans| spans.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Reporter for InMemoryReporter {
    fn report(&self, span: FinishedSpan) {
        if self.closed.load(Ordering::SeqCst) {
            warn!(
                "dropping span `{}` reported after close",
                span.operation_name
            );
            return;
        }
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        } else {
            warn!("in-memory reporter lock poisoned, span dropped");
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Logs each finished span through `tracing`.
///
/// The fallback production reporter when no collector is configured.
#[derive(Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, span: FinishedSpan) {
        debug!(
            trace_id = %span.context.trace_id_hex(),
            span_id = %span.context.span_id_hex(),
            operation = %span.operation_name,
            sampled = span.context.sampling.sampled,
            "span finished"
        );
    }
}
