// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ForwarderError;
use crate::hostname::get_hostname;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::warn;

pub const DATADOG_LOGS_INTAKE_URL: &str = "https://http-intake.logs.datadoghq.eu/v1/input";
pub const DEFAULT_DATADOG_SERVICE: &str = "udp_to_http_forwarder";
const DEFAULT_LOG_LEVEL: &str = "info";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings for mirroring lifecycle events to the Datadog HTTP log intake.
///
/// Only built when an API token is supplied; its presence is what enables the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatadogLoggerConfig {
    pub api_key: String,
    pub hostname: String,
    pub service: String,
    pub intake_url: String,
}

impl DatadogLoggerConfig {
    /// Uses the detected machine hostname, the default service and the EU intake.
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            hostname: get_hostname(),
            service: DEFAULT_DATADOG_SERVICE.to_string(),
            intake_url: DATADOG_LOGS_INTAKE_URL.to_string(),
        }
    }
}

/// Forwarder configuration. Shared as `Arc<Config>` once the listener starts.
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP bind target, `host:port`
    pub udp_bind_address: String,
    /// Absolute URL every datagram is POSTed to
    pub http_target_url: String,
    /// Extra headers merged into every forward request
    pub http_extra_headers: HashMap<String, String>,
    /// Sent as `Authentication: Bearer <token>` when set
    pub http_bearer_token: Option<String>,
    /// Per-request timeout; `None` keeps the HTTP client default (no timeout)
    pub http_timeout: Option<Duration>,
    pub https_proxy: Option<String>,
    pub datadog: Option<DatadogLoggerConfig>,
    pub log_level: String,
}

impl Config {
    pub fn new(udp_bind_address: &str, http_target_url: &str) -> Self {
        Self {
            udp_bind_address: udp_bind_address.to_string(),
            http_target_url: http_target_url.to_string(),
            http_extra_headers: HashMap::new(),
            http_bearer_token: None,
            http_timeout: None,
            https_proxy: None,
            datadog: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ForwarderError> {
        let udp_bind_address = non_empty_var("UDP_SERVER_ADDRESS")
            .ok_or(ForwarderError::MissingConfig("UDP_SERVER_ADDRESS"))?;
        let http_target_url = non_empty_var("HTTP_FORWARDING_URL")
            .ok_or(ForwarderError::MissingConfig("HTTP_FORWARDING_URL"))?;

        let http_extra_headers = non_empty_var("HTTP_FORWARDING_HEADERS")
            .map(|headers| parse_extra_headers(&headers))
            .unwrap_or_default();
        let http_timeout = match non_empty_var("HTTP_FORWARDING_TIMEOUT_MS") {
            Some(raw) => Some(raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                ForwarderError::InvalidConfig(format!(
                    "HTTP_FORWARDING_TIMEOUT_MS must be a number of milliseconds, got '{raw}'"
                ))
            })?),
            None => None,
        };

        let datadog = non_empty_var("DATADOG_API_TOKEN").map(|api_key| {
            let mut datadog = DatadogLoggerConfig::new(&api_key);
            // DATADOG_LOGS_INTAKE_URL is primarily used for integration tests
            if let Some(intake_url) = non_empty_var("DATADOG_LOGS_INTAKE_URL") {
                datadog.intake_url = intake_url;
            }
            datadog
        });

        let config = Self {
            udp_bind_address,
            http_target_url,
            http_extra_headers,
            http_bearer_token: non_empty_var("HTTP_FORWARDING_BEARER_TOKEN"),
            http_timeout,
            https_proxy: non_empty_var("HTTPS_PROXY"),
            datadog,
            log_level: non_empty_var("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ForwarderError> {
        if self.udp_bind_address.trim().is_empty() {
            return Err(ForwarderError::MissingConfig("UDP_SERVER_ADDRESS"));
        }
        if self.http_target_url.trim().is_empty() {
            return Err(ForwarderError::MissingConfig("HTTP_FORWARDING_URL"));
        }

        let url = reqwest::Url::parse(&self.http_target_url).map_err(|e| {
            ForwarderError::InvalidConfig(format!(
                "HTTP forwarding URL '{}' is not an absolute URL: {e}",
                self.http_target_url
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ForwarderError::InvalidConfig(format!(
                "HTTP forwarding URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ForwarderError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

/// Parses `Name:Value` pairs separated by commas or newlines.
///
/// Only the first `:` splits a pair, so values may contain colons. Malformed entries are
/// skipped. A later duplicate name overrides an earlier one.
pub fn parse_extra_headers(raw: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for entry in raw.split([',', '\n']) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
            _ => warn!("Ignoring malformed HTTP_FORWARDING_HEADERS entry: '{}'", entry),
        }
    }
    headers
}
