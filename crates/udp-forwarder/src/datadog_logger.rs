// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mirrors lifecycle events to the Datadog HTTP log intake.
//!
//! Every entry becomes one POST with a `DD-API-KEY` header. Failures are logged locally and
//! dropped; nothing is retried or reported back to the forwarding path.

use crate::config::DatadogLoggerConfig;
use crate::dispatcher::error_chain;
use crate::mirror::{LogContext, LogMirror, MirrorEntry};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

pub const DDSOURCE: &str = "udp_forwarder";
const DD_API_KEY_HEADER: &str = "dd-api-key";

/// Intake request body
#[derive(Debug, Serialize)]
pub struct IntakeLog<'a> {
    pub ddsource: &'static str,
    pub hostname: &'a str,
    pub service: &'a str,
    pub message: &'a str,
    pub level: &'static str,
    pub context: &'a LogContext,
}

#[derive(Debug, Clone)]
pub struct DatadogLogger {
    client: reqwest::Client,
    config: DatadogLoggerConfig,
}

impl DatadogLogger {
    /// `client` is the same client used for forwarding.
    pub fn new(config: DatadogLoggerConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    fn headers(&self) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut api_key = HeaderValue::from_str(&self.config.api_key)
            .map_err(|e| format!("invalid API key header: {e}"))?;
        api_key.set_sensitive(true);
        headers.insert(DD_API_KEY_HEADER, api_key);
        Ok(headers)
    }

    /// Sends one entry. Returns the intake status code or the error text.
    pub async fn log_to_datadog(&self, entry: &MirrorEntry) -> Result<u16, String> {
        debug!(log_message = %entry.message, "Logging to Datadog...");

        let headers = self.headers()?;
        let body = IntakeLog {
            ddsource: DDSOURCE,
            hostname: &self.config.hostname,
            service: &self.config.service,
            message: &entry.message,
            level: entry.level().as_str(),
            context: &entry.context,
        };

        let response = self
            .client
            .post(&self.config.intake_url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| error_chain(&e))?;

        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl LogMirror for DatadogLogger {
    fn enabled(&self) -> bool {
        true
    }

    async fn mirror(&self, entry: MirrorEntry) {
        let result = self.log_to_datadog(&entry).await;
        let level = entry.level().as_str();
        let context = Value::Object(entry.context);
        match result {
            Ok(status_code) => {
                debug!(
                    status_code,
                    %context,
                    "Logged to Datadog"
                );
            }
            Err(datadog_error) => {
                error!(
                    datadog_error = %datadog_error,
                    log_level = level,
                    log_message = %entry.message,
                    log_original_error = entry.error.as_deref(),
                    %context,
                    "Logging to Datadog failed"
                );
            }
        }
    }
}
