//! Text map propagators for the HTTP header and RPC metadata formats.
//!
//! Both formats carry the same logical fields (trace identity, sampling
//! flags, baggage) with a vocabulary per transport:
//!
//! **HTTP headers:**
//! ```text
//! x-tracekit-trace-id: 00000000000000004bf92f3577b34da6
//! x-tracekit-span-id: 00f067aa0ba902b7
//! x-tracekit-parent-id: 53ce929d0e0e4736
//! x-tracekit-sampled: 1
//! x-tracekit-debug: 1
//! tracekit-baggage-tenant: acme
//! ```
//!
//! **RPC metadata (JSON object members):**
//! ```text
//! trace-id: 00000000000000004bf92f3577b34da6
//! span-id: 00f067aa0ba902b7
//! parent-id: 53ce929d0e0e4736
//! sampled: 1
//! debug: 1
//! baggage-tenant: acme
//! ```
//!
//! Identity fields are fixed-width lowercase hex: 32 chars for the 128-bit
//! trace id, 16 chars for span ids. Flags are `"1"`/`"0"`; the debug flag is
//! omitted when clear. One baggage entry becomes one prefixed key.
//!
//! Extraction requires a well-formed trace id and span id. Anything else
//! (missing fields, wrong width, non-hex digits, all-zero ids) makes
//! `extract` return `None` so a corrupt upstream carrier degrades to a new
//! trace instead of failing the request. Unknown carrier keys are ignored.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::context::{SamplingState, SpanContext};
use crate::propagation::{
    carrier::{Extractor, Injector},
    error::Error,
    Propagator,
};

/// HTTP header carrying the 128-bit trace id.
pub const HTTP_TRACE_ID_KEY: &str = "x-tracekit-trace-id";
/// HTTP header carrying the sender's span id.
pub const HTTP_SPAN_ID_KEY: &str = "x-tracekit-span-id";
/// HTTP header carrying the sender's parent span id, absent for roots.
pub const HTTP_PARENT_ID_KEY: &str = "x-tracekit-parent-id";
/// HTTP header carrying the sampling decision.
pub const HTTP_SAMPLED_KEY: &str = "x-tracekit-sampled";
/// HTTP header carrying the debug override, present only when set.
pub const HTTP_DEBUG_KEY: &str = "x-tracekit-debug";
/// Prefix of the per-entry HTTP baggage headers.
pub const HTTP_BAGGAGE_PREFIX: &str = "tracekit-baggage-";

/// RPC metadata key carrying the 128-bit trace id.
pub const RPC_TRACE_ID_KEY: &str = "trace-id";
/// RPC metadata key carrying the sender's span id.
pub const RPC_SPAN_ID_KEY: &str = "span-id";
/// RPC metadata key carrying the sender's parent span id.
pub const RPC_PARENT_ID_KEY: &str = "parent-id";
/// RPC metadata key carrying the sampling decision.
pub const RPC_SAMPLED_KEY: &str = "sampled";
/// RPC metadata key carrying the debug override.
pub const RPC_DEBUG_KEY: &str = "debug";
/// Prefix of the per-entry RPC baggage keys.
pub const RPC_BAGGAGE_PREFIX: &str = "baggage-";

lazy_static! {
    /// 128-bit trace id: exactly 32 hex chars.
    static ref TRACE_ID_REGEX: Regex =
        Regex::new(r"(?i)^[a-f0-9]{32}$").expect("failed creating regex");

    /// 64-bit span id: exactly 16 hex chars.
    static ref SPAN_ID_REGEX: Regex =
        Regex::new(r"(?i)^[a-f0-9]{16}$").expect("failed creating regex");

    /// All-zero identifiers are reserved and invalid on the wire.
    static ref INVALID_SEGMENT_REGEX: Regex = Regex::new(r"^0+$").expect("failed creating regex");
}

/// Key vocabulary shared by both text map formats.
struct TextMapCodec {
    trace_id_key: &'static str,
    span_id_key: &'static str,
    parent_id_key: &'static str,
    sampled_key: &'static str,
    debug_key: &'static str,
    baggage_prefix: &'static str,
    name: &'static str,
}

const HTTP_CODEC: TextMapCodec = TextMapCodec {
    trace_id_key: HTTP_TRACE_ID_KEY,
    span_id_key: HTTP_SPAN_ID_KEY,
    parent_id_key: HTTP_PARENT_ID_KEY,
    sampled_key: HTTP_SAMPLED_KEY,
    debug_key: HTTP_DEBUG_KEY,
    baggage_prefix: HTTP_BAGGAGE_PREFIX,
    name: "http-headers",
};

const RPC_CODEC: TextMapCodec = TextMapCodec {
    trace_id_key: RPC_TRACE_ID_KEY,
    span_id_key: RPC_SPAN_ID_KEY,
    parent_id_key: RPC_PARENT_ID_KEY,
    sampled_key: RPC_SAMPLED_KEY,
    debug_key: RPC_DEBUG_KEY,
    baggage_prefix: RPC_BAGGAGE_PREFIX,
    name: "rpc-metadata",
};

impl TextMapCodec {
    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        carrier.set(self.trace_id_key, format!("{:032x}", context.trace_id));
        carrier.set(self.span_id_key, format!("{:016x}", context.span_id));
        if let Some(parent_id) = context.parent_span_id {
            carrier.set(self.parent_id_key, format!("{parent_id:016x}"));
        }
        carrier.set(self.sampled_key, flag(context.sampling.sampled));
        if context.sampling.debug {
            carrier.set(self.debug_key, flag(true));
        }
        for (key, value) in &context.baggage {
            carrier.set(&format!("{}{key}", self.baggage_prefix), value.clone());
        }
    }

    fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext> {
        let trace_id = match self.extract_trace_id(carrier) {
            Ok(trace_id) => trace_id,
            Err(e) => {
                debug!("{e}");
                return None;
            }
        };
        let span_id = match self.extract_span_id(carrier, self.span_id_key) {
            Ok(span_id) => span_id,
            Err(e) => {
                debug!("{e}");
                return None;
            }
        };

        // The parent id is informational; a malformed one does not invalidate
        // the trace identity.
        let parent_span_id = carrier
            .get(self.parent_id_key)
            .and_then(|parent_id| Self::parse_span_id(parent_id).ok());

        Some(SpanContext {
            trace_id,
            span_id,
            parent_span_id,
            sampling: SamplingState {
                sampled: self.extract_flag(carrier, self.sampled_key),
                debug: self.extract_flag(carrier, self.debug_key),
            },
            baggage: self.extract_baggage(carrier),
        })
    }

    fn extract_trace_id(&self, carrier: &dyn Extractor) -> Result<u128, Error> {
        let trace_id = carrier
            .get(self.trace_id_key)
            .ok_or(Error::extract("trace id not found", self.name))?;

        if !TRACE_ID_REGEX.is_match(trace_id) || INVALID_SEGMENT_REGEX.is_match(trace_id) {
            return Err(Error::extract("invalid trace id", self.name));
        }

        u128::from_str_radix(trace_id, 16)
            .map_err(|_| Error::extract("failed to decode trace id", self.name))
    }

    fn extract_span_id(&self, carrier: &dyn Extractor, key: &str) -> Result<u64, Error> {
        let span_id = carrier
            .get(key)
            .ok_or(Error::extract("span id not found", self.name))?;

        Self::parse_span_id(span_id).map_err(|message| Error::extract(message, self.name))
    }

    fn parse_span_id(span_id: &str) -> Result<u64, &'static str> {
        if !SPAN_ID_REGEX.is_match(span_id) || INVALID_SEGMENT_REGEX.is_match(span_id) {
            return Err("invalid span id");
        }

        u64::from_str_radix(span_id, 16).map_err(|_| "failed to decode span id")
    }

    fn extract_flag(&self, carrier: &dyn Extractor, key: &str) -> bool {
        matches!(carrier.get(key), Some("1") | Some("true"))
    }

    fn extract_baggage(&self, carrier: &dyn Extractor) -> HashMap<String, String> {
        let mut baggage = HashMap::new();
        for key in carrier.keys() {
            if let Some(stripped) = key.strip_prefix(self.baggage_prefix) {
                baggage.insert(
                    stripped.to_string(),
                    carrier.get(key).unwrap_or_default().to_string(),
                );
            }
        }
        baggage
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// Propagator for the `x-tracekit-*` HTTP header format.
#[derive(Clone, Copy)]
pub struct HttpHeaderPropagator;

impl Propagator for HttpHeaderPropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext> {
        HTTP_CODEC.extract(carrier)
    }

    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        HTTP_CODEC.inject(context, carrier);
    }
}

/// Propagator for the RPC envelope metadata format.
#[derive(Clone, Copy)]
pub struct RpcMetadataPropagator;

impl Propagator for RpcMetadataPropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext> {
        RPC_CODEC.extract(carrier)
    }

    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        RPC_CODEC.inject(context, carrier);
    }
}
