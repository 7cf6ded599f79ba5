// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # tracekit
//!
//! Core building blocks of a distributed-tracing client:
//!
//! - [`context`]: span context (trace identity, sampling state, baggage)
//! - [`span`]: span lifecycle and the finished-span snapshot handed to reporters
//! - [`sampler`]: trace-start sampling decisions (const, probabilistic, rate limiting)
//! - [`reporter`]: sinks for finished spans (in-memory, log)
//! - [`propagation`]: carriers and propagators that move context across
//!   process and transport boundaries
//! - [`tracer`]: the factory tying the above together
//!
//! The crate is transport-agnostic: HTTP servers, RPC stacks, and collector
//! clients live with the applications that embed a [`tracer::Tracer`].
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use tracekit::propagation::Format;
//! use tracekit::reporter::InMemoryReporter;
//! use tracekit::sampler::ConstSampler;
//! use tracekit::tracer::{SpanStartOptions, Tracer};
//!
//! let reporter = Arc::new(InMemoryReporter::new());
//! let tracer = Tracer::new("my-service", Box::new(ConstSampler::new(true)), reporter.clone());
//!
//! let mut span = tracer.start_span("handle-request", SpanStartOptions::default());
//! span.set_baggage_item("tenant", "acme");
//!
//! // Hand the context to an outbound request.
//! let mut headers: HashMap<String, String> = HashMap::new();
//! tracer
//!     .inject(span.context(), Format::HttpHeaders, &mut headers)
//!     .expect("http propagator is registered by default");
//!
//! span.finish();
//! assert_eq!(reporter.len(), 1);
//! ```

pub mod context;
pub mod error;
pub mod propagation;
pub mod reporter;
pub mod sampler;
pub mod span;
pub mod tracer;

pub use context::{SamplingState, SpanContext};
pub use error::ConfigError;
pub use reporter::{InMemoryReporter, LogReporter, Reporter};
pub use sampler::{ConstSampler, ProbabilisticSampler, RateLimitingSampler, Sampler};
pub use span::{FinishedSpan, Span};
pub use tracer::{SpanStartOptions, Tracer};
