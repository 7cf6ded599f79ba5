//! Carrier traits for trace context propagation.
//!
//! Carriers abstract the transport-specific container that trace context
//! travels in: an HTTP header map, the metadata object of an RPC envelope, or
//! a plain map in tests. Two implementations are provided:
//!
//! - **`HashMap<String, String>`**: HTTP header maps and in-memory tests
//! - **`serde_json::Value`**: JSON metadata objects of RPC envelopes
//!
//! All implementations are case-insensitive (keys are normalized to
//! lowercase on write and lookup) because HTTP intermediaries are free to
//! change header casing.
//!
//! Code inspired and adapted from the OpenTelemetry Rust project:
//! <https://github.com/open-telemetry/opentelemetry-rust/blob/main/opentelemetry/src/propagation/mod.rs>

use std::collections::HashMap;

use serde_json::Value;

/// Write side of a carrier.
///
/// Keys are normalized to lowercase so a later [`Extractor`] lookup matches
/// regardless of the casing the transport delivered.
pub trait Injector {
    /// Sets a key/value pair in the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Read side of a carrier.
pub trait Extractor {
    /// Gets a value by key, case-insensitively.
    fn get(&self, key: &str) -> Option<&str>;

    /// All keys present in the carrier, in stored (lowercase) form.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect::<Vec<_>>()
    }
}

/// `Injector` for JSON metadata objects.
///
/// Only `Value::Object` carriers are writable; sets on any other variant are
/// silently ignored.
impl Injector for Value {
    fn set(&mut self, key: &str, value: String) {
        if let Value::Object(map) = self {
            map.insert(key.to_lowercase(), Value::String(value));
        }
    }
}

/// `Extractor` for JSON metadata objects.
///
/// Non-object values and non-string members yield `None`.
impl Extractor for Value {
    fn get(&self, key: &str) -> Option<&str> {
        if let Value::Object(map) = self {
            map.get(&key.to_lowercase()).and_then(|v| v.as_str())
        } else {
            None
        }
    }

    fn keys(&self) -> Vec<&str> {
        if let Value::Object(map) = self {
            map.keys().map(String::as_str).collect::<Vec<_>>()
        } else {
            Vec::new()
        }
    }
}
