// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The chain-propagation orchestrator.
//!
//! One handler serves every role in the chain. For each inbound request it
//! starts the hop's span (continuing the inbound trace when a context was
//! extracted, starting a new one otherwise), calls the next hop over the
//! requested transport with the current context injected, finishes its span,
//! and composes the nested report.
//!
//! A failed downstream call fails only that branch of the report: the local
//! span still finishes and reports, and the branch carries an error marker
//! instead of a nested record.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use tracekit::context::SpanContext;
use tracekit::propagation::Format;
use tracekit::span::Span;
use tracekit::tracer::{SpanStartOptions, Tracer};

use crate::error::TransportError;
use crate::http_utils;
use crate::messages::{
    Downstream, JoinTraceRequest, ObservedSpan, StartTraceRequest, TraceResponse, Transport,
    BAGGAGE_KEY,
};
use crate::rpc;
use crate::server::JOIN_TRACE_PATH;

const SPAN_KIND_TAG_KEY: &str = "span.kind";

/// One hop's behavior, independent of the transport it was reached over.
///
/// The trace context is extracted by the serving transport and passed in
/// explicitly; handlers never read ambient global state.
#[async_trait]
pub trait TraceHandler: Send + Sync {
    /// Handles the head of a chain: starts a new trace.
    async fn start_trace(&self, request: StartTraceRequest) -> TraceResponse;

    /// Handles an intermediate hop: continues the trace carried by
    /// `context`, or starts a new one when no valid context arrived.
    async fn join_trace(
        &self,
        request: JoinTraceRequest,
        context: Option<SpanContext>,
    ) -> TraceResponse;
}

/// Production handler backed by a [`Tracer`].
pub struct CrossdockHandler {
    tracer: Tracer,
    downstream_timeout: Duration,
}

impl CrossdockHandler {
    #[must_use]
    pub fn new(tracer: Tracer, downstream_timeout: Duration) -> Self {
        Self {
            tracer,
            downstream_timeout,
        }
    }

    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Common tail of both endpoints: call downstream if requested, finish
    /// the local span, compose the report.
    async fn run_chain(&self, mut span: Span, downstream: Option<Downstream>) -> TraceResponse {
        let nested = match downstream {
            Some(downstream) => {
                span.log_event(format!(
                    "calling {} downstream {}",
                    downstream.transport, downstream.server_role
                ));
                match self.call_downstream(span.context(), &downstream).await {
                    Ok(response) => Some(Box::new(response)),
                    Err(e) => {
                        error!("downstream {} call failed: {e}", downstream.server_role);
                        Some(Box::new(TraceResponse::from_error(e.to_string())))
                    }
                }
            }
            None => None,
        };

        let observed = observe_span(&span);
        span.finish();

        TraceResponse {
            span: Some(observed),
            downstream: nested,
            error: None,
        }
    }

    async fn call_downstream(
        &self,
        context: &SpanContext,
        downstream: &Downstream,
    ) -> Result<TraceResponse, TransportError> {
        let port: u16 = downstream
            .port
            .parse()
            .map_err(|_| TransportError::InvalidPort(downstream.port.clone()))?;

        let request = JoinTraceRequest {
            server_role: downstream.server_role.clone(),
            downstream: downstream.downstream.as_ref().map(|next| (**next).clone()),
        };

        match downstream.transport {
            Transport::Http => {
                self.call_http(context, &downstream.host, port, request).await
            }
            Transport::Rpc => self.call_rpc(context, &downstream.host, port, request).await,
        }
    }

    async fn call_http(
        &self,
        context: &SpanContext,
        host: &str,
        port: u16,
        request: JoinTraceRequest,
    ) -> Result<TraceResponse, TransportError> {
        let mut headers: HashMap<String, String> = HashMap::new();
        self.tracer
            .inject(context, Format::HttpHeaders, &mut headers)
            .map_err(|_| TransportError::Unsupported(Transport::Http))?;
        let body =
            serde_json::to_vec(&request).map_err(|e| TransportError::Decode(e.to_string()))?;

        let call = http_utils::post_json(host, port, JOIN_TRACE_PATH, &headers, body);
        let (status, bytes) = tokio::time::timeout(self.downstream_timeout, call)
            .await
            .map_err(|_| TransportError::Timeout(self.downstream_timeout))??;

        if !status.is_success() {
            return Err(TransportError::Status(status));
        }
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn call_rpc(
        &self,
        context: &SpanContext,
        host: &str,
        port: u16,
        request: JoinTraceRequest,
    ) -> Result<TraceResponse, TransportError> {
        let mut metadata = Value::Object(serde_json::Map::new());
        self.tracer
            .inject(context, Format::RpcMetadata, &mut metadata)
            .map_err(|_| TransportError::Unsupported(Transport::Rpc))?;

        rpc::call_join_trace(host, port, metadata, request, self.downstream_timeout).await
    }
}

#[async_trait]
impl TraceHandler for CrossdockHandler {
    async fn start_trace(&self, request: StartTraceRequest) -> TraceResponse {
        let mut span = self.tracer.start_span(
            &request.server_role,
            SpanStartOptions {
                child_of: None,
                tags: server_tags(),
                forced_sampling: request.sampled,
            },
        );
        if let Some(baggage) = &request.baggage {
            span.set_baggage_item(BAGGAGE_KEY, baggage);
        }

        self.run_chain(span, request.downstream).await
    }

    async fn join_trace(
        &self,
        request: JoinTraceRequest,
        context: Option<SpanContext>,
    ) -> TraceResponse {
        let span = self.tracer.start_span(
            &request.server_role,
            SpanStartOptions {
                child_of: context,
                tags: server_tags(),
                forced_sampling: None,
            },
        );

        self.run_chain(span, request.downstream).await
    }
}

fn server_tags() -> HashMap<String, String> {
    HashMap::from([(SPAN_KIND_TAG_KEY.to_string(), "server".to_string())])
}

/// Snapshot of what this hop observed, taken before the span finishes.
fn observe_span(span: &Span) -> ObservedSpan {
    ObservedSpan {
        trace_id: span.context().trace_id_hex(),
        sampled: span.context().sampling.sampled,
        baggage: span
            .baggage_item(BAGGAGE_KEY)
            .unwrap_or_default()
            .to_string(),
    }
}
