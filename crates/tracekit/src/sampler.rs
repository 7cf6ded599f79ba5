// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace-start sampling.
//!
//! A sampler is consulted exactly once per trace, when the root span is
//! created. The decision is frozen into the root's
//! [`SamplingState`](crate::context::SamplingState) and inherited verbatim by
//! every descendant, locally and across transport boundaries; child spans
//! never re-sample.
//!
//! Sampler-emitted tags (`sampler.type`, `sampler.param`) are attached to the
//! root span only, so the backend can tell how the decision was made.
//!
//! A faulty sampler is never fatal: the tracer recovers from
//! [`SamplingError`] by starting the trace unsampled.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use thiserror::Error;

/// Root-span tag naming the sampler that made the decision.
pub const SAMPLER_TYPE_TAG_KEY: &str = "sampler.type";
/// Root-span tag carrying the sampler's parameter (decision, rate, or limit).
pub const SAMPLER_PARAM_TAG_KEY: &str = "sampler.param";

const SAMPLER_TYPE_CONST: &str = "const";
const SAMPLER_TYPE_PROBABILISTIC: &str = "probabilistic";
const SAMPLER_TYPE_RATE_LIMITING: &str = "ratelimiting";

/// Outcome of a sampling consultation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplingDecision {
    /// Whether the trace's spans are handed to the reporter.
    pub sampled: bool,
    /// Tags to attach to the root span.
    pub tags: HashMap<String, String>,
}

impl SamplingDecision {
    fn new(sampled: bool, sampler_type: &str, param: String) -> Self {
        Self {
            sampled,
            tags: HashMap::from([
                (SAMPLER_TYPE_TAG_KEY.to_string(), sampler_type.to_string()),
                (SAMPLER_PARAM_TAG_KEY.to_string(), param),
            ]),
        }
    }
}

/// Sampler implementation fault.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplingError {
    #[error("sampling rate {0} is outside [0.0, 1.0]")]
    InvalidRate(f64),
    #[error("sampler state lock poisoned")]
    LockPoisoned,
}

/// Decides, once per trace, whether a trace is sampled.
pub trait Sampler: Send + Sync {
    /// Makes the sampling decision for a new trace.
    ///
    /// Called only when a root span is created; `trace_id` is the freshly
    /// generated identifier and `operation` the root span's operation name.
    fn is_sampled(
        &self,
        trace_id: u128,
        operation: &str,
    ) -> Result<SamplingDecision, SamplingError>;
}

/// Always returns the same decision. Used for deterministic tests and for
/// honoring an explicitly requested decision.
pub struct ConstSampler {
    decision: bool,
}

impl ConstSampler {
    #[must_use]
    pub fn new(decision: bool) -> Self {
        Self { decision }
    }
}

impl Sampler for ConstSampler {
    fn is_sampled(
        &self,
        _trace_id: u128,
        _operation: &str,
    ) -> Result<SamplingDecision, SamplingError> {
        Ok(SamplingDecision::new(
            self.decision,
            SAMPLER_TYPE_CONST,
            self.decision.to_string(),
        ))
    }
}

/// Samples a fixed fraction of traces by hashing the trace id against a rate.
///
/// The low 64 bits of the (uniformly random) trace id are compared against
/// `rate * u64::MAX`, so the same trace id always yields the same decision.
#[derive(Debug)]
pub struct ProbabilisticSampler {
    rate: f64,
    threshold: u64,
}

impl ProbabilisticSampler {
    pub fn new(rate: f64) -> Result<Self, SamplingError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(SamplingError::InvalidRate(rate));
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let threshold = (rate * u64::MAX as f64) as u64;
        Ok(Self { rate, threshold })
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Sampler for ProbabilisticSampler {
    fn is_sampled(
        &self,
        trace_id: u128,
        _operation: &str,
    ) -> Result<SamplingDecision, SamplingError> {
        #[allow(clippy::cast_possible_truncation)]
        let lower_bits = trace_id as u64;
        Ok(SamplingDecision::new(
            lower_bits < self.threshold,
            SAMPLER_TYPE_PROBABILISTIC,
            self.rate.to_string(),
        ))
    }
}

/// Samples at most `max_per_second` traces per second via a token bucket.
pub struct RateLimitingSampler {
    max_per_second: f64,
    state: Mutex<TokenBucket>,
}

struct TokenBucket {
    balance: f64,
    last_tick: Instant,
}

impl RateLimitingSampler {
    #[must_use]
    pub fn new(max_per_second: f64) -> Self {
        Self {
            max_per_second,
            state: Mutex::new(TokenBucket {
                // Start with a full second's worth of credit so short-lived
                // processes can sample at all.
                balance: max_per_second.max(1.0),
                last_tick: Instant::now(),
            }),
        }
    }
}

impl Sampler for RateLimitingSampler {
    fn is_sampled(
        &self,
        _trace_id: u128,
        _operation: &str,
    ) -> Result<SamplingDecision, SamplingError> {
        let mut bucket = self.state.lock().map_err(|_| SamplingError::LockPoisoned)?;

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_tick).as_secs_f64();
        bucket.last_tick = now;
        bucket.balance =
            (bucket.balance + elapsed * self.max_per_second).min(self.max_per_second.max(1.0));

        let sampled = bucket.balance >= 1.0;
        if sampled {
            bucket.balance -= 1.0;
        }

        Ok(SamplingDecision::new(
            sampled,
            SAMPLER_TYPE_RATE_LIMITING,
            self.max_per_second.to_string(),
        ))
    }
}
