// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Crossdock wire messages.
//!
//! The downstream chain is described by a recursive request shape: a
//! [`Downstream`] optionally contains the next hop's [`Downstream`], and the
//! composite [`TraceResponse`] nests the same way on the way back up.
//! Field names are camelCase on the wire for compatibility with the other
//! crossdock implementations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Baggage key exercised by the crossdock suite. The driver sets a value
/// under this key at the head of the chain and expects to observe it,
/// unmodified, at every hop.
pub const BAGGAGE_KEY: &str = "crossdock-baggage-key";

/// Wire transports a hop can call downstream over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "RPC")]
    Rpc,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => write!(f, "HTTP"),
            Transport::Rpc => write!(f, "RPC"),
        }
    }
}

/// One hop of the requested downstream chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Downstream {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    pub server_role: String,
    pub transport: Transport,
    pub host: String,
    /// Kept as a string on the wire, as the other implementations send it.
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Box<Downstream>>,
}

/// Request starting a new trace at the head of the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTraceRequest {
    pub server_role: String,
    /// Explicitly requested sampling decision for the new trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampled: Option<bool>,
    /// Baggage value to set under [`BAGGAGE_KEY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baggage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Downstream>,
}

/// Request joining a trace that is already in flight; the trace context
/// arrives out of band, in the serving transport's carrier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTraceRequest {
    pub server_role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Downstream>,
}

/// What one hop observed about its span.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedSpan {
    /// Trace id as 32 lowercase hex chars.
    pub trace_id: String,
    pub sampled: bool,
    /// Value observed under [`BAGGAGE_KEY`], empty when absent.
    pub baggage: String,
}

/// Composite report for a hop and everything downstream of it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<ObservedSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Box<TraceResponse>>,
    /// Error marker for a failed branch; the rest of the response is still
    /// meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceResponse {
    /// Record for a branch that failed outright.
    #[must_use]
    pub fn from_error(message: String) -> Self {
        TraceResponse {
            span: None,
            downstream: None,
            error: Some(message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_start_trace_request_from_driver_json() {
        // The shape the crossdock driver sends for a 3-hop chain.
        let body = r#"{
            "serverRole": "s1",
            "sampled": true,
            "baggage": "Zoidberg",
            "downstream": {
                "serviceName": "rust",
                "serverRole": "s2",
                "transport": "HTTP",
                "host": "localhost",
                "port": "8080",
                "downstream": {
                    "serverRole": "s3",
                    "transport": "RPC",
                    "host": "localhost",
                    "port": "8082"
                }
            }
        }"#;

        let request: StartTraceRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.server_role, "s1");
        assert_eq!(request.sampled, Some(true));
        assert_eq!(request.baggage.as_deref(), Some("Zoidberg"));

        let s2 = request.downstream.unwrap();
        assert_eq!(s2.transport, Transport::Http);
        assert_eq!(s2.port, "8080");

        let s3 = s2.downstream.unwrap();
        assert_eq!(s3.transport, Transport::Rpc);
        assert_eq!(s3.downstream, None);
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        let body = r#"{"serverRole": "s1", "downstream": {
            "serverRole": "s2", "transport": "TCHANNEL",
            "host": "localhost", "port": "9999"
        }}"#;

        assert!(serde_json::from_str::<StartTraceRequest>(body).is_err());
    }

    #[test]
    fn test_trace_response_omits_absent_fields() {
        let response = TraceResponse {
            span: Some(ObservedSpan {
                trace_id: "00000000000000000000000000000001".to_string(),
                sampled: false,
                baggage: String::new(),
            }),
            downstream: None,
            error: None,
        };

        let encoded = serde_json::to_string(&response).unwrap();
        assert!(!encoded.contains("downstream"));
        assert!(!encoded.contains("error"));
        assert!(encoded.contains("traceId"));

        let decoded: TraceResponse = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_nested_response_round_trip() {
        let response = TraceResponse {
            span: Some(ObservedSpan {
                trace_id: "0000000000000000000000000000beef".to_string(),
                sampled: true,
                baggage: "Zoidberg".to_string(),
            }),
            downstream: Some(Box::new(TraceResponse::from_error(
                "connection refused".to_string(),
            ))),
            error: None,
        };

        let encoded = serde_json::to_string(&response).unwrap();
        let decoded: TraceResponse = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(
            decoded.downstream.unwrap().error.as_deref(),
            Some("connection refused")
        );
    }
}
