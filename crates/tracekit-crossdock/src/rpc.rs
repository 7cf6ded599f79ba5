// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The RPC transport: line-delimited JSON over TCP.
//!
//! Each request is one JSON object on one line, an envelope of propagation
//! metadata plus the join payload:
//!
//! ```text
//! {"metadata": {"trace-id": "…", "span-id": "…", "sampled": "1"}, "body": {"serverRole": "s3"}}
//! ```
//!
//! The response is one [`TraceResponse`] per line. The metadata object is the
//! propagation carrier for [`Format::RpcMetadata`], playing the role HTTP
//! headers play on the HTTP transport. A connection may carry any number of
//! request/response pairs in order.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{tcp::OwnedWriteHalf, TcpListener, TcpStream};
use tracing::{debug, error};

use tracekit::propagation::Format;
use tracekit::tracer::Tracer;

use crate::error::TransportError;
use crate::handler::TraceHandler;
use crate::messages::{JoinTraceRequest, TraceResponse};

/// One RPC request: propagation metadata plus the join payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Carrier for the trace context; an arbitrary JSON object.
    #[serde(default)]
    pub metadata: Value,
    pub body: JoinTraceRequest,
}

/// Issues one `join_trace` call over the RPC transport.
///
/// `timeout` bounds the whole call, connect included.
pub async fn call_join_trace(
    host: &str,
    port: u16,
    metadata: Value,
    body: JoinTraceRequest,
    timeout: Duration,
) -> Result<TraceResponse, TransportError> {
    let call = async {
        let stream =
            TcpStream::connect((host, port))
                .await
                .map_err(|source| TransportError::Connect {
                    host: host.to_string(),
                    port,
                    source,
                })?;
        let (read_half, mut write_half) = stream.into_split();

        let mut frame = serde_json::to_string(&RpcRequest { metadata, body })
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        frame.push('\n');
        write_half.write_all(frame.as_bytes()).await?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = String::new();
        if reader.read_line(&mut response_line).await? == 0 {
            return Err(TransportError::Decode(
                "connection closed before response".to_string(),
            ));
        }
        serde_json::from_str(&response_line).map_err(|e| TransportError::Decode(e.to_string()))
    };

    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
}

/// Serves the RPC transport on `listener`, one task per connection.
pub async fn serve(
    listener: TcpListener,
    tracer: Tracer,
    handler: Arc<dyn TraceHandler>,
) -> anyhow::Result<()> {
    debug!("RPC transport listening on {}", listener.local_addr()?);

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionRefused
                ) =>
            {
                continue;
            }
            Err(e) => {
                error!("RPC server error: {e}");
                return Err(e.into());
            }
        };

        let tracer = tracer.clone();
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, tracer, handler).await {
                debug!("RPC connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    tracer: Tracer,
    handler: Arc<dyn TraceHandler>,
) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatch(&line, &tracer, handler.as_ref()).await;
        write_response(&mut write_half, &response).await?;
    }
    Ok(())
}

async fn dispatch(line: &str, tracer: &Tracer, handler: &dyn TraceHandler) -> TraceResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => {
            // A missing or malformed metadata carrier degrades to "no
            // context": the hop starts a new trace instead of failing.
            let context = tracer
                .extract(Format::RpcMetadata, &request.metadata)
                .ok()
                .flatten();
            handler.join_trace(request.body, context).await
        }
        Err(e) => TraceResponse::from_error(format!("invalid rpc request: {e}")),
    }
}

async fn write_response(
    write_half: &mut OwnedWriteHalf,
    response: &TraceResponse,
) -> io::Result<()> {
    match serde_json::to_string(response) {
        Ok(mut frame) => {
            frame.push('\n');
            write_half.write_all(frame.as_bytes()).await
        }
        Err(e) => {
            error!("failed to encode rpc response: {e}");
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::messages::ObservedSpan;
    use tracekit::context::SpanContext;
    use tracekit::reporter::InMemoryReporter;
    use tracekit::sampler::ConstSampler;

    /// Reports the context it was (or was not) given.
    struct EchoHandler;

    #[async_trait]
    impl TraceHandler for EchoHandler {
        async fn start_trace(&self, _request: crate::messages::StartTraceRequest) -> TraceResponse {
            unreachable!("rpc transport only joins traces")
        }

        async fn join_trace(
            &self,
            request: JoinTraceRequest,
            context: Option<SpanContext>,
        ) -> TraceResponse {
            TraceResponse {
                span: context.map(|context| ObservedSpan {
                    trace_id: context.trace_id_hex(),
                    sampled: context.sampling.sampled,
                    baggage: context
                        .baggage_item("crossdock-baggage-key")
                        .unwrap_or_default()
                        .to_string(),
                }),
                downstream: None,
                error: Some(request.server_role),
            }
        }
    }

    fn test_tracer() -> Tracer {
        Tracer::new(
            "rpc-test",
            Box::new(ConstSampler::new(true)),
            Arc::new(InMemoryReporter::new()),
        )
    }

    async fn start_echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, test_tracer(), Arc::new(EchoHandler)));
        port
    }

    #[tokio::test]
    async fn test_call_round_trips_context_through_metadata() {
        let port = start_echo_server().await;
        let tracer = test_tracer();

        let context = SpanContext {
            trace_id: 0xbeef,
            span_id: 0xf00d,
            sampling: tracekit::context::SamplingState {
                sampled: true,
                debug: false,
            },
            ..Default::default()
        }
        .with_baggage_item("crossdock-baggage-key", "Zoidberg");

        let mut metadata = Value::Object(serde_json::Map::new());
        tracer
            .inject(&context, Format::RpcMetadata, &mut metadata)
            .unwrap();

        let response = call_join_trace(
            "127.0.0.1",
            port,
            metadata,
            JoinTraceRequest {
                server_role: "s3".to_string(),
                downstream: None,
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let observed = response.span.unwrap();
        assert_eq!(observed.trace_id, context.trace_id_hex());
        assert!(observed.sampled);
        assert_eq!(observed.baggage, "Zoidberg");
        assert_eq!(response.error.as_deref(), Some("s3"));
    }

    #[tokio::test]
    async fn test_empty_metadata_joins_without_context() {
        let port = start_echo_server().await;

        let response = call_join_trace(
            "127.0.0.1",
            port,
            Value::Object(serde_json::Map::new()),
            JoinTraceRequest {
                server_role: "s3".to_string(),
                downstream: None,
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert!(response.span.is_none());
    }

    #[tokio::test]
    async fn test_malformed_request_line_gets_error_response() {
        let port = start_echo_server().await;

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"this is not json\n").await.unwrap();

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let response: TraceResponse = serde_json::from_str(&line).unwrap();
        assert!(response
            .error
            .unwrap()
            .starts_with("invalid rpc request"));
    }

    #[tokio::test]
    async fn test_call_times_out_on_silent_server() {
        // A listener that accepts and then never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let timeout = Duration::from_millis(100);
        let result = call_join_trace(
            "127.0.0.1",
            port,
            Value::Object(serde_json::Map::new()),
            JoinTraceRequest {
                server_role: "s3".to_string(),
                downstream: None,
            },
            timeout,
        )
        .await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
