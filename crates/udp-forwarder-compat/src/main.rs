// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use udp_forwarder::{config::Config, forwarder::Forwarder, logger::Formatter};

// Upper bound on how long shutdown waits for pending forward requests
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves once shutdown is requested. If the signal handler cannot be installed the
/// forwarder keeps running until the process is killed.
async fn shutdown_requested(signal: impl Future<Output = io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("Received shutdown signal, stopping UDP forwarder"),
        Err(e) => {
            error!("Unable to listen for shutdown signal, running until killed: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> ExitCode {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.trim().to_lowercase())
        .ok()
        .filter(|val| !val.is_empty())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("[FATAL] Could not parse LOG_LEVEL '{log_level}': {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[FATAL] Setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("[FATAL] {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel_token = CancellationToken::new();
    let forwarder = match Forwarder::from_config(config, cancel_token.clone()) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("[FATAL] {e}");
            return ExitCode::FAILURE;
        }
    };

    let running = match forwarder.start().await {
        Ok(running) => running,
        Err(e) => {
            error!("[FATAL] {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("udp-forwarder: listening on {}", running.local_addr());

    let in_flight = running.in_flight();
    let spin = tokio::spawn(running.spin());

    shutdown_requested(tokio::signal::ctrl_c()).await;
    cancel_token.cancel();
    if let Err(e) = spin.await {
        error!("UDP forwarder task failed: {e}");
        return ExitCode::FAILURE;
    }

    if !in_flight.wait_idle(SHUTDOWN_DRAIN_TIMEOUT).await {
        warn!(
            pending = in_flight.count(),
            "Shutting down with forward requests still pending"
        );
    }

    ExitCode::SUCCESS
}
