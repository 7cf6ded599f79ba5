// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Downstream transport errors.
//!
//! A `TransportError` fails the report of one branch of the chain: it becomes
//! the error marker on that branch's
//! [`TraceResponse`](crate::messages::TraceResponse) and never aborts sibling
//! branches or the local span's own finish and report.

use std::time::Duration;

use thiserror::Error;

use crate::messages::Transport;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The requested transport has no registered context encoding on this
    /// hop. The orchestrator never falls back to a different transport.
    #[error("transport {0} is not supported by this hop")]
    Unsupported(Transport),
    #[error("invalid downstream port `{0}`")]
    InvalidPort(String),
    #[error("failed to connect to downstream {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("downstream call timed out after {0:?}")]
    Timeout(Duration),
    #[error("downstream returned status {0}")]
    Status(hyper::StatusCode),
    #[error("failed to decode downstream response: {0}")]
    Decode(String),
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid http request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),
    #[error("rpc i/o error: {0}")]
    Io(#[from] std::io::Error),
}
