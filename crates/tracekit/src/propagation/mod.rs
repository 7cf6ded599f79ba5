//! Trace context propagation across process and transport boundaries.
//!
//! Propagation is what connects spans created in different processes into one
//! trace. On the way out, a span's context is *injected* into a
//! transport-specific carrier (HTTP headers, an RPC metadata map); on the way
//! in, the context is *extracted* from the carrier and becomes the parent of
//! the receiving hop's span.
//!
//! ```text
//! Outbound request                         Inbound request
//!   SpanContext                              carrier (headers / metadata)
//!     ↓ inject                                 ↓ extract
//!   carrier (headers / metadata)             Some(SpanContext) → child span
//!                                            None              → new root span
//! ```
//!
//! Extraction is deliberately forgiving: a missing or malformed carrier never
//! fails the inbound request, it just means "start a new trace".

use crate::context::SpanContext;
use carrier::{Extractor, Injector};

pub mod carrier;
pub mod error;
pub mod text_map_propagator;

/// Wire formats a tracer can be asked to inject into or extract from.
///
/// Each format maps to one registered [`Propagator`] and one carrier shape:
/// HTTP header maps for [`Format::HttpHeaders`], JSON metadata objects for
/// [`Format::RpcMetadata`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// HTTP request headers (`x-tracekit-*`).
    HttpHeaders,
    /// Metadata map of an RPC envelope.
    RpcMetadata,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::HttpHeaders => write!(f, "http-headers"),
            Format::RpcMetadata => write!(f, "rpc-metadata"),
        }
    }
}

/// Encoder/decoder of span contexts for one wire format.
///
/// Implementations must be thread-safe; the tracer shares its propagator
/// registry across all in-flight requests without locking.
pub trait Propagator {
    /// Reads a span context out of a carrier.
    ///
    /// Returns `None` when no valid trace identity is present, including
    /// malformed identity fields, which degrade to "no context" rather than
    /// an error so a corrupt upstream header cannot crash the hop.
    fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext>;

    /// Writes a span context into a carrier.
    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector);
}
