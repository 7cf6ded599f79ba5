// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc, time::Duration};

use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use tracekit::sampler::{ProbabilisticSampler, Sampler};
use tracekit::tracer::Tracer;
use tracekit_crossdock::{
    config,
    flusher::{ChannelReporter, SpanFlusher},
    handler::CrossdockHandler,
    server::CrossdockServer,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("TRACEKIT_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Starting crossdock hop");

    let config = match config::Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on crossdock startup: {e}");
            return;
        }
    };

    let sampler: Box<dyn Sampler> = match ProbabilisticSampler::new(config.sampling_rate) {
        Ok(sampler) => Box::new(sampler),
        Err(e) => {
            error!("Error creating sampler on crossdock startup: {e}");
            return;
        }
    };

    let (reporter, span_rx) = ChannelReporter::new();
    let tracer = Tracer::new(&config.service_name, sampler, Arc::new(reporter));

    debug!(
        "Shipping spans to collector at {}:{}",
        config.collector_host, config.collector_port
    );
    let flusher = SpanFlusher::new(
        &config.service_name,
        &config.collector_host,
        config.collector_port,
        Duration::from_secs(config.flush_interval_secs),
    );
    tokio::spawn(flusher.start(span_rx));

    let handler = Arc::new(CrossdockHandler::new(
        tracer.clone(),
        config.downstream_timeout,
    ));

    let server = CrossdockServer {
        config: Arc::clone(&config),
        tracer,
        handler,
    };
    if let Err(e) = server.start().await {
        error!("Error when running crossdock servers: {e:?}");
    }
}
