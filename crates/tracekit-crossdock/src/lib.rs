// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Crossdock interoperability harness for the tracekit tracing client.
//!
//! A crossdock hop is one service instance in a chain under test
//! (S1 → S2 → S3). Each hop:
//!
//! 1. receives a request over HTTP (`/start_trace`, `/join_trace`) or over
//!    the line-delimited JSON RPC transport,
//! 2. continues the inbound trace (or starts a new one at the head of the
//!    chain),
//! 3. calls the next hop over the transport named in the request, carrying
//!    the current span context,
//! 4. reports what it observed (trace id, sampling decision, baggage) as a
//!    nested [`messages::TraceResponse`].
//!
//! The assertions live with the test driver: every hop must observe the same
//! trace id, the root's sampling decision, and the root's baggage.

pub mod config;
pub mod error;
pub mod flusher;
pub mod handler;
pub mod http_utils;
pub mod messages;
pub mod rpc;
pub mod server;
