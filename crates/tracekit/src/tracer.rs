// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The tracer: span factory and propagation registry.
//!
//! A [`Tracer`] owns the sampler, the reporter, and one propagator per wire
//! format. It is cheap to clone (`Arc` inner) and safe to share across
//! in-flight requests; the propagator registry is frozen at construction, so
//! no per-call locking is needed.
//!
//! `start_span` never fails: a sampler fault falls back to an unsampled root,
//! and an invalid parent context falls back to a new root. Only `inject` and
//! `extract` can fail, with a [`ConfigError`] when the caller names a wire
//! format the tracer has no propagator for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::warn;

use crate::context::{SamplingState, SpanContext};
use crate::error::ConfigError;
use crate::propagation::{
    carrier::{Extractor, Injector},
    text_map_propagator::{HttpHeaderPropagator, RpcMetadataPropagator},
    Format, Propagator,
};
use crate::reporter::Reporter;
use crate::sampler::{Sampler, SamplingDecision};
use crate::span::Span;

/// Options for [`Tracer::start_span`].
#[derive(Default)]
pub struct SpanStartOptions {
    /// Parent context; `None` (or an invalid context) starts a new root.
    pub child_of: Option<SpanContext>,
    /// Tags set on the span at creation time.
    pub tags: HashMap<String, String>,
    /// Explicitly requested sampling decision for a new root, bypassing the
    /// configured sampler. Ignored when a valid parent is present.
    pub forced_sampling: Option<bool>,
}

struct Inner {
    service_name: String,
    sampler: Box<dyn Sampler>,
    reporter: Arc<dyn Reporter>,
    propagators: HashMap<Format, Box<dyn Propagator + Send + Sync>>,
    closed: AtomicBool,
}

/// Span factory and propagation registry.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<Inner>,
}

impl Tracer {
    /// Creates a tracer with the default propagators registered for
    /// [`Format::HttpHeaders`] and [`Format::RpcMetadata`].
    #[must_use]
    pub fn new(
        service_name: &str,
        sampler: Box<dyn Sampler>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let mut propagators: HashMap<Format, Box<dyn Propagator + Send + Sync>> = HashMap::new();
        propagators.insert(Format::HttpHeaders, Box::new(HttpHeaderPropagator));
        propagators.insert(Format::RpcMetadata, Box::new(RpcMetadataPropagator));

        Self::with_propagators(service_name, sampler, reporter, propagators)
    }

    /// Creates a tracer with an explicit propagator registry.
    #[must_use]
    pub fn with_propagators(
        service_name: &str,
        sampler: Box<dyn Sampler>,
        reporter: Arc<dyn Reporter>,
        propagators: HashMap<Format, Box<dyn Propagator + Send + Sync>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service_name: service_name.to_string(),
                sampler,
                reporter,
                propagators,
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Starts a span.
    ///
    /// With a valid parent context, the span continues the parent's trace:
    /// same trace id, parent id set, sampling state and baggage copied.
    /// Without one, a fresh trace identity is generated and the sampler is
    /// consulted exactly once.
    pub fn start_span(&self, operation_name: &str, options: SpanStartOptions) -> Span {
        let mut tags = options.tags;

        let mut context = match options.child_of {
            Some(parent) if parent.is_valid() => SpanContext {
                trace_id: parent.trace_id,
                span_id: random_span_id(),
                parent_span_id: Some(parent.span_id),
                sampling: parent.sampling,
                baggage: parent.baggage,
            },
            _ => {
                let trace_id = random_trace_id();
                let decision =
                    self.root_decision(trace_id, operation_name, options.forced_sampling);
                tags.extend(decision.tags);
                SpanContext {
                    trace_id,
                    span_id: random_span_id(),
                    parent_span_id: None,
                    sampling: SamplingState {
                        sampled: decision.sampled,
                        debug: false,
                    },
                    baggage: HashMap::new(),
                }
            }
        };

        if self.inner.closed.load(Ordering::SeqCst) {
            warn!("start_span(`{operation_name}`) on a closed tracer; span will not be reported");
            context.sampling = SamplingState::default();
        }

        Span::new(
            context,
            operation_name,
            tags,
            Arc::clone(&self.inner.reporter),
        )
    }

    fn root_decision(
        &self,
        trace_id: u128,
        operation_name: &str,
        forced_sampling: Option<bool>,
    ) -> SamplingDecision {
        if let Some(sampled) = forced_sampling {
            // An explicitly requested decision is recorded as a const
            // decision; the configured sampler is not consulted.
            return SamplingDecision {
                sampled,
                tags: HashMap::from([
                    (
                        crate::sampler::SAMPLER_TYPE_TAG_KEY.to_string(),
                        "const".to_string(),
                    ),
                    (
                        crate::sampler::SAMPLER_PARAM_TAG_KEY.to_string(),
                        sampled.to_string(),
                    ),
                ]),
            };
        }

        match self.inner.sampler.is_sampled(trace_id, operation_name) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("sampler failed for `{operation_name}`: {e}; trace will not be sampled");
                SamplingDecision::default()
            }
        }
    }

    /// Writes `context` into `carrier` using the propagator registered for
    /// `format`.
    pub fn inject(
        &self,
        context: &SpanContext,
        format: Format,
        carrier: &mut dyn Injector,
    ) -> Result<(), ConfigError> {
        let propagator = self
            .inner
            .propagators
            .get(&format)
            .ok_or(ConfigError(format))?;
        propagator.inject(context, carrier);
        Ok(())
    }

    /// Reads a context from `carrier` using the propagator registered for
    /// `format`. `Ok(None)` means "no valid context present": the caller
    /// should start a new trace.
    pub fn extract(
        &self,
        format: Format,
        carrier: &dyn Extractor,
    ) -> Result<Option<SpanContext>, ConfigError> {
        let propagator = self
            .inner
            .propagators
            .get(&format)
            .ok_or(ConfigError(format))?;
        Ok(propagator.extract(carrier))
    }

    /// Closes the tracer and its reporter. Spans started afterwards are
    /// valid but unsampled, and nothing further is reported.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.reporter.close();
        }
    }
}

fn random_trace_id() -> u128 {
    loop {
        let id = rand::thread_rng().gen::<u128>();
        if id != 0 {
            return id;
        }
    }
}

fn random_span_id() -> u64 {
    loop {
        let id = rand::thread_rng().gen::<u64>();
        if id != 0 {
            return id;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::reporter::InMemoryReporter;
    use crate::sampler::{ConstSampler, SamplingError, SAMPLER_TYPE_TAG_KEY};

    struct CountingSampler {
        calls: Arc<AtomicUsize>,
        decision: bool,
    }

    impl Sampler for CountingSampler {
        fn is_sampled(
            &self,
            _trace_id: u128,
            _operation: &str,
        ) -> Result<SamplingDecision, SamplingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SamplingDecision {
                sampled: self.decision,
                tags: HashMap::new(),
            })
        }
    }

    struct FailingSampler;

    impl Sampler for FailingSampler {
        fn is_sampled(
            &self,
            _trace_id: u128,
            _operation: &str,
        ) -> Result<SamplingDecision, SamplingError> {
            Err(SamplingError::LockPoisoned)
        }
    }

    fn test_tracer(sampler: Box<dyn Sampler>) -> (Tracer, Arc<InMemoryReporter>) {
        let reporter = Arc::new(InMemoryReporter::new());
        let tracer = Tracer::new("test-tracer", sampler, reporter.clone());
        (tracer, reporter)
    }

    #[test]
    fn test_root_span_has_fresh_identity() {
        let (tracer, _) = test_tracer(Box::new(ConstSampler::new(true)));

        let a = tracer.start_span("a", SpanStartOptions::default());
        let b = tracer.start_span("b", SpanStartOptions::default());

        assert!(a.context().is_valid());
        assert_eq!(a.context().parent_span_id, None);
        assert_ne!(a.context().trace_id, b.context().trace_id);
    }

    #[test]
    fn test_child_inherits_trace_identity_sampling_and_baggage() {
        let (tracer, _) = test_tracer(Box::new(ConstSampler::new(true)));

        let mut root = tracer.start_span("root", SpanStartOptions::default());
        root.set_baggage_item("tenant", "acme");
        let root_context = root.context().clone();

        let child = tracer.start_span(
            "child",
            SpanStartOptions {
                child_of: Some(root_context.clone()),
                ..Default::default()
            },
        );

        assert_eq!(child.context().trace_id, root_context.trace_id);
        assert_eq!(child.context().parent_span_id, Some(root_context.span_id));
        assert_ne!(child.context().span_id, root_context.span_id);
        assert_eq!(child.context().sampling, root_context.sampling);
        assert_eq!(child.baggage_item("tenant"), Some("acme"));
    }

    #[test]
    fn test_sampler_called_once_per_trace() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tracer, _) = test_tracer(Box::new(CountingSampler {
            calls: calls.clone(),
            decision: true,
        }));

        let root = tracer.start_span("root", SpanStartOptions::default());
        let parent_context = root.context().clone();
        let _child = tracer.start_span(
            "child",
            SpanStartOptions {
                child_of: Some(parent_context.clone()),
                ..Default::default()
            },
        );
        let _grandchild = tracer.start_span(
            "grandchild",
            SpanStartOptions {
                child_of: Some(parent_context),
                ..Default::default()
            },
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forced_sampling_bypasses_sampler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tracer, _) = test_tracer(Box::new(CountingSampler {
            calls: calls.clone(),
            decision: false,
        }));

        let span = tracer.start_span(
            "forced",
            SpanStartOptions {
                forced_sampling: Some(true),
                ..Default::default()
            },
        );

        assert!(span.context().sampling.sampled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let span = tracer.start_span(
            "forced-off",
            SpanStartOptions {
                forced_sampling: Some(false),
                ..Default::default()
            },
        );
        assert!(!span.context().sampling.sampled);
    }

    #[test]
    fn test_sampler_error_falls_back_to_unsampled() {
        let (tracer, reporter) = test_tracer(Box::new(FailingSampler));

        let mut span = tracer.start_span("root", SpanStartOptions::default());
        assert!(!span.context().sampling.sampled);
        assert!(span.context().is_valid());

        span.finish();
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_sampler_tags_attached_to_root_only() {
        let (tracer, reporter) = test_tracer(Box::new(ConstSampler::new(true)));

        let mut root = tracer.start_span("root", SpanStartOptions::default());
        let parent_context = root.context().clone();
        let mut child = tracer.start_span(
            "child",
            SpanStartOptions {
                child_of: Some(parent_context),
                ..Default::default()
            },
        );
        root.finish();
        child.finish();

        let spans = reporter.spans();
        let root_span = spans
            .iter()
            .find(|s| s.operation_name == "root")
            .unwrap();
        let child_span = spans
            .iter()
            .find(|s| s.operation_name == "child")
            .unwrap();
        assert_eq!(root_span.tags.get(SAMPLER_TYPE_TAG_KEY).unwrap(), "const");
        assert!(!child_span.tags.contains_key(SAMPLER_TYPE_TAG_KEY));
    }

    #[test]
    fn test_inject_extract_round_trip() {
        let (tracer, _) = test_tracer(Box::new(ConstSampler::new(true)));
        let mut span = tracer.start_span("root", SpanStartOptions::default());
        span.set_baggage_item("crossdock-baggage-key", "Zoidberg");

        let mut carrier: HashMap<String, String> = HashMap::new();
        tracer
            .inject(span.context(), Format::HttpHeaders, &mut carrier)
            .unwrap();

        let extracted = tracer
            .extract(Format::HttpHeaders, &carrier)
            .unwrap()
            .expect("context should round trip");
        assert_eq!(&extracted, span.context());
    }

    #[test]
    fn test_unregistered_format_is_a_config_error() {
        let reporter = Arc::new(InMemoryReporter::new());
        let tracer = Tracer::with_propagators(
            "bare",
            Box::new(ConstSampler::new(true)),
            reporter,
            HashMap::new(),
        );

        let mut carrier: HashMap<String, String> = HashMap::new();
        assert_eq!(
            tracer.inject(&SpanContext::default(), Format::HttpHeaders, &mut carrier),
            Err(ConfigError(Format::HttpHeaders))
        );
        assert_eq!(
            tracer.extract(Format::RpcMetadata, &carrier),
            Err(ConfigError(Format::RpcMetadata))
        );
    }

    #[test]
    fn test_extract_empty_carrier_is_not_an_error() {
        let (tracer, _) = test_tracer(Box::new(ConstSampler::new(true)));
        let carrier: HashMap<String, String> = HashMap::new();

        assert_eq!(tracer.extract(Format::HttpHeaders, &carrier), Ok(None));
    }

    #[test]
    fn test_closed_tracer_still_starts_spans_but_reports_nothing() {
        let (tracer, reporter) = test_tracer(Box::new(ConstSampler::new(true)));

        tracer.close();
        let mut span = tracer.start_span("late", SpanStartOptions::default());
        assert!(span.context().is_valid());
        span.finish();

        assert!(reporter.is_empty());
    }
}
