// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Construction of the `reqwest::Client` shared by the forwarding path and the Datadog
//! log mirror.

use crate::config::Config;
use core::time::Duration;
use std::error::Error;
use tracing::{debug, error};

/// Creates the HTTP client used for every outbound request.
///
/// If the proxy configuration is invalid an error is logged and a direct client is built
/// instead, so a bad proxy never prevents the forwarder from starting.
#[must_use]
pub fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn create_reqwest_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().use_rustls_tls()
}

fn build_client(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = create_reqwest_client_builder()
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    // No timeout unless configured: a slow target keeps its requests pending
    if let Some(timeout) = config.http_timeout {
        client = client.timeout(timeout);
    }

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            debug!("Using HTTPS proxy {}", https_uri);
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}
