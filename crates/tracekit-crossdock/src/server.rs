// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The crossdock hop server: HTTP endpoints plus the RPC transport.
//!
//! Routes:
//! - `POST /start_trace`: head of the chain, starts a new trace
//! - `POST /join_trace`: intermediate hop, continues the inbound trace
//!   carried in the `x-tracekit-*` headers
//! - `HEAD|GET /`: health check used by the crossdock driver
//!
//! The RPC transport serves `join_trace` only; see [`crate::rpc`].

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{http, HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error};

use tracekit::propagation::Format;
use tracekit::tracer::Tracer;

use crate::config::Config;
use crate::handler::TraceHandler;
use crate::http_utils::{json_response, log_and_create_http_response, Body};
use crate::messages::{JoinTraceRequest, StartTraceRequest};
use crate::{http_utils, rpc};

pub const START_TRACE_PATH: &str = "/start_trace";
pub const JOIN_TRACE_PATH: &str = "/join_trace";
pub const HEALTH_PATH: &str = "/";

pub struct CrossdockServer {
    pub config: Arc<Config>,
    pub tracer: Tracer,
    pub handler: Arc<dyn TraceHandler>,
}

impl CrossdockServer {
    /// Binds the configured ports and serves both transports until one of
    /// them fails.
    pub async fn start(&self) -> anyhow::Result<()> {
        let http_addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let rpc_addr = SocketAddr::from(([0, 0, 0, 0], self.config.rpc_port));
        let http_listener = TcpListener::bind(&http_addr).await?;
        let rpc_listener = TcpListener::bind(&rpc_addr).await?;

        self.serve(http_listener, rpc_listener).await
    }

    /// Serves both transports on pre-bound listeners. Tests bind ephemeral
    /// ports and pass the listeners in.
    pub async fn serve(
        &self,
        http_listener: TcpListener,
        rpc_listener: TcpListener,
    ) -> anyhow::Result<()> {
        debug!(
            "crossdock HTTP server listening on {}",
            http_listener.local_addr()?
        );

        tokio::try_join!(
            self.serve_http(http_listener),
            rpc::serve(rpc_listener, self.tracer.clone(), Arc::clone(&self.handler)),
        )?;
        Ok(())
    }

    async fn serve_http(&self, listener: TcpListener) -> anyhow::Result<()> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                conn_res = listener.accept() => match conn_res {
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
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill the server on panic - log and continue
                        error!("Connection handler panicked: {e:?}");
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };

            let io = TokioIo::new(conn);
            let server = server.clone();
            let tracer = self.tracer.clone();
            let handler = Arc::clone(&self.handler);
            let max_content_length = self.config.max_request_content_length;
            joinset.spawn(async move {
                let service = service_fn(move |req| {
                    endpoint_handler(
                        tracer.clone(),
                        Arc::clone(&handler),
                        max_content_length,
                        req,
                    )
                });
                if let Err(e) = server.serve_connection(io, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }
    }
}

async fn endpoint_handler(
    tracer: Tracer,
    handler: Arc<dyn TraceHandler>,
    max_content_length: usize,
    req: Request<Incoming>,
) -> http::Result<Response<Body>> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, START_TRACE_PATH) => {
            start_trace_handler(handler, max_content_length, req).await
        }
        (&Method::POST, JOIN_TRACE_PATH) => {
            join_trace_handler(tracer, handler, max_content_length, req).await
        }
        (&Method::HEAD | &Method::GET, HEALTH_PATH) => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from_static(b"OK"))),
        _ => {
            let mut not_found = Response::new(Body::default());
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

async fn start_trace_handler(
    handler: Arc<dyn TraceHandler>,
    max_content_length: usize,
    req: Request<Incoming>,
) -> http::Result<Response<Body>> {
    let (parts, body) = req.into_parts();
    if let Some(response) = http_utils::verify_request_content_length(
        &parts.headers,
        max_content_length,
        "Error processing start_trace",
    ) {
        return response;
    }

    let request = match read_json_body::<StartTraceRequest>(body).await {
        Ok(request) => request,
        Err(message) => {
            return log_and_create_http_response(
                &format!("Error processing start_trace: {message}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };

    let response = handler.start_trace(request).await;
    json_response(&response, StatusCode::OK)
}

async fn join_trace_handler(
    tracer: Tracer,
    handler: Arc<dyn TraceHandler>,
    max_content_length: usize,
    req: Request<Incoming>,
) -> http::Result<Response<Body>> {
    let (parts, body) = req.into_parts();
    if let Some(response) = http_utils::verify_request_content_length(
        &parts.headers,
        max_content_length,
        "Error processing join_trace",
    ) {
        return response;
    }

    // Malformed or absent trace headers degrade to "no context"; the hop
    // starts a new trace rather than failing the request.
    let carrier = header_carrier(&parts.headers);
    let context = tracer
        .extract(Format::HttpHeaders, &carrier)
        .ok()
        .flatten();

    let request = match read_json_body::<JoinTraceRequest>(body).await {
        Ok(request) => request,
        Err(message) => {
            return log_and_create_http_response(
                &format!("Error processing join_trace: {message}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };

    let response = handler.join_trace(request, context).await;
    json_response(&response, StatusCode::OK)
}

async fn read_json_body<T: serde::de::DeserializeOwned>(body: Incoming) -> Result<T, String> {
    let bytes = body
        .collect()
        .await
        .map_err(|e| format!("error reading request body: {e}"))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| format!("error deserializing request body: {e}"))
}

/// Copies the string-valued headers into a propagation carrier.
///
/// Hyper stores header names lowercased, matching the carrier contract.
fn header_carrier(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(key, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (key.as_str().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use hyper::header::HeaderValue;

    use super::*;
    use tracekit::propagation::carrier::Extractor;

    #[test]
    fn test_header_carrier_keeps_trace_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Tracekit-Trace-Id",
            HeaderValue::from_static("4bf92f3577b34da6a3ce929d0e0e4736"),
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let carrier = header_carrier(&headers);
        assert_eq!(
            Extractor::get(&carrier, "x-tracekit-trace-id"),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
    }

    #[test]
    fn test_header_carrier_skips_non_utf8_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-binary",
            HeaderValue::from_bytes(&[0xff, 0xfe]).expect("opaque bytes are a valid header value"),
        );

        let carrier = header_carrier(&headers);
        assert!(carrier.is_empty());
    }
}
