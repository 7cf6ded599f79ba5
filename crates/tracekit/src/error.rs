// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Caller-visible tracer errors.
//!
//! Only configuration mistakes surface to callers: asking the tracer to
//! inject or extract with a wire format it has no propagator for. Extraction
//! problems (malformed carriers) and sampler faults are recovered internally
//! and never reach this type.

use thiserror::Error;

use crate::propagation::Format;

/// The tracer was asked to use a wire format it is not configured for.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no propagator registered for format `{0}`")]
pub struct ConfigError(pub Format);
