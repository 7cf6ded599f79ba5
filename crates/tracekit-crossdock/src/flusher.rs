// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ships finished spans to a collector.
//!
//! The pipeline is reporter → channel → flusher: the [`ChannelReporter`]
//! forwards every reportable finished span into an unbounded channel, and the
//! [`SpanFlusher`] drains it, buffering spans and POSTing JSON batches to the
//! collector on an interval. A failed send keeps the batch buffered for the
//! next attempt, bounded by a buffer cap that drops the oldest spans first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use tracekit::reporter::Reporter;
use tracekit::span::FinishedSpan;

use crate::error::TransportError;
use crate::http_utils;

const SPANS_ENDPOINT_PATH: &str = "/api/v1/spans";
const MAX_BUFFERED_SPANS: usize = 1000;

/// Reporter that forwards finished spans into the flusher's channel.
pub struct ChannelReporter {
    tx: UnboundedSender<FinishedSpan>,
    closed: AtomicBool,
}

impl ChannelReporter {
    /// Returns the reporter and the receiver to hand to [`SpanFlusher::start`].
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<FinishedSpan>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, span: FinishedSpan) {
        if self.closed.load(Ordering::SeqCst) {
            warn!(
                "dropping span `{}` reported after close",
                span.operation_name
            );
            return;
        }
        if self.tx.send(span).is_err() {
            warn!("span flusher is gone, span dropped");
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpanBatch<'a> {
    service_name: &'a str,
    spans: &'a [FinishedSpan],
}

/// Buffers finished spans and ships them to the collector in batches.
pub struct SpanFlusher {
    service_name: String,
    collector_host: String,
    collector_port: u16,
    flush_interval: Duration,
}

impl SpanFlusher {
    #[must_use]
    pub fn new(
        service_name: &str,
        collector_host: &str,
        collector_port: u16,
        flush_interval: Duration,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            collector_host: collector_host.to_string(),
            collector_port,
            flush_interval,
        }
    }

    /// Runs until the reporter side closes, flushing on an interval and once
    /// more on shutdown.
    pub async fn start(self, mut rx: UnboundedReceiver<FinishedSpan>) {
        let mut buffer: Vec<FinishedSpan> = Vec::new();
        let mut flush_interval = tokio::time::interval(self.flush_interval);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                span = rx.recv() => match span {
                    Some(span) => {
                        if buffer.len() >= MAX_BUFFERED_SPANS {
                            warn!("span buffer full, dropping oldest span");
                            buffer.remove(0);
                        }
                        buffer.push(span);
                    }
                    None => {
                        self.flush(&mut buffer).await;
                        debug!("span reporter closed, flusher stopping");
                        return;
                    }
                },
                _ = flush_interval.tick() => self.flush(&mut buffer).await,
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<FinishedSpan>) {
        if buffer.is_empty() {
            return;
        }
        debug!("Flushing {} spans", buffer.len());
        match self.send(buffer).await {
            Ok(()) => buffer.clear(),
            // Keep the batch for the next interval.
            Err(e) => error!("Error sending spans, will retry: {e}"),
        }
    }

    async fn send(&self, spans: &[FinishedSpan]) -> Result<(), TransportError> {
        let batch = SpanBatch {
            service_name: &self.service_name,
            spans,
        };
        let body = serde_json::to_vec(&batch).map_err(|e| TransportError::Decode(e.to_string()))?;

        let (status, _) = http_utils::post_json(
            &self.collector_host,
            self.collector_port,
            SPANS_ENDPOINT_PATH,
            &HashMap::new(),
            body,
        )
        .await?;

        if !status.is_success() {
            return Err(TransportError::Status(status));
        }
        Ok(())
    }
}
