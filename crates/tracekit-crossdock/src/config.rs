// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

const DEFAULT_SERVICE_NAME: &str = "crossdock-rust";
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_RPC_PORT: u16 = 8082;
const DEFAULT_COLLECTOR_HOST: &str = "localhost";
const DEFAULT_COLLECTOR_PORT: u16 = 14268;
const DEFAULT_SAMPLING_RATE: f64 = 0.001;
const DEFAULT_DOWNSTREAM_TIMEOUT_SECS: u64 = 2;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 1;

/// Environment variable holding the collector discovery value, `host:port`.
pub const COLLECTOR_HOST_PORT_ENV: &str = "TRACEKIT_COLLECTOR_HOST_PORT";

#[derive(Debug)]
pub struct Config {
    pub service_name: String,
    pub http_port: u16,
    pub rpc_port: u16,
    /// Collector the span flusher ships finished spans to.
    pub collector_host: String,
    pub collector_port: u16,
    /// Default sampling rate for traces started without an explicit decision.
    pub sampling_rate: f64,
    /// Time limit for one downstream call, connect included.
    pub downstream_timeout: Duration,
    pub max_request_content_length: usize,
    /// How often the span flusher ships its buffer, in seconds.
    pub flush_interval_secs: u64,
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let service_name =
            env::var("TRACEKIT_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

        let http_port = port_from_env("TRACEKIT_HTTP_PORT", DEFAULT_HTTP_PORT);
        let rpc_port = port_from_env("TRACEKIT_RPC_PORT", DEFAULT_RPC_PORT);

        let sampling_rate = match env::var("TRACEKIT_SAMPLING_RATE") {
            Ok(value) => {
                let rate: f64 = value.parse().map_err(|_| {
                    anyhow::anyhow!("TRACEKIT_SAMPLING_RATE is not a number: {value}")
                })?;
                if !(0.0..=1.0).contains(&rate) {
                    return Err(
                        anyhow::anyhow!("TRACEKIT_SAMPLING_RATE must be within [0, 1]: {rate}")
                            .into(),
                    );
                }
                rate
            }
            Err(_) => DEFAULT_SAMPLING_RATE,
        };

        let downstream_timeout_secs = env::var("TRACEKIT_DOWNSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DOWNSTREAM_TIMEOUT_SECS);

        let (collector_host, collector_port) = determine_collector_host_port();

        Ok(Config {
            service_name,
            http_port,
            rpc_port,
            collector_host,
            collector_port,
            sampling_rate,
            downstream_timeout: Duration::from_secs(downstream_timeout_secs),
            max_request_content_length: 1024 * 1024, // 1MiB in Bytes
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        })
    }
}

fn port_from_env(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(default)
}

/// Reads the collector discovery value from the environment.
///
/// Absent or malformed values fall back to the documented defaults; discovery
/// never fails.
pub fn determine_collector_host_port() -> (String, u16) {
    let value = env::var(COLLECTOR_HOST_PORT_ENV).unwrap_or_default();
    parse_host_port(&value, DEFAULT_COLLECTOR_HOST, DEFAULT_COLLECTOR_PORT)
}

/// Parses a `host:port` discovery string.
///
/// An empty value yields the defaults unchanged; anything malformed (missing
/// colon, empty host, non-numeric port) yields the default host with the
/// default port rather than failing.
pub fn parse_host_port(value: &str, default_host: &str, default_port: u16) -> (String, u16) {
    if value.is_empty() {
        return (default_host.to_string(), default_port);
    }

    match value.split_once(':') {
        Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (default_host.to_string(), default_port),
        },
        _ => (default_host.to_string(), default_port),
    }
}
