// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! POSTs encoded datagrams to the HTTP target.

use crate::config::Config;
use crate::encoder::ForwardPayload;
use crate::error::ForwarderError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use tracing::debug;

/// Header carrying the bearer token. The receiving endpoint reads `Authentication`, not
/// `Authorization`; both sides must change together.
pub const BEARER_TOKEN_HEADER: &str = "Authentication";

/// Terminal result of one forward attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Success { status_code: u16 },
    Failure { error: String },
}

impl ForwardOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for ForwardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { status_code } => write!(f, "status {status_code}"),
            Self::Failure { error } => write!(f, "error: {error}"),
        }
    }
}

/// Builds the forward request headers.
///
/// `Content-Type: application/json` first, then the extra headers (which may override it),
/// then the bearer token header if a token is configured.
pub fn build_headers(
    extra_headers: &HashMap<String, String>,
    bearer_token: Option<&str>,
) -> Result<HeaderMap, ForwarderError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in extra_headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ForwarderError::InvalidHeader(format!("'{name}': {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| ForwarderError::InvalidHeader(format!("value of '{name}': {e}")))?;
        headers.insert(header_name, header_value);
    }

    if let Some(token) = bearer_token {
        let mut header_value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            ForwarderError::InvalidHeader(format!("value of '{BEARER_TOKEN_HEADER}': {e}"))
        })?;
        header_value.set_sensitive(true);
        headers.insert(HeaderName::from_static("authentication"), header_value);
    }

    Ok(headers)
}

/// Renders an error with its sources, e.g. `error sending request: tcp connect error:
/// Connection refused`. reqwest keeps the root cause out of its own `Display`.
pub fn error_chain(error: &dyn Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.ends_with(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}

/// Sends forward requests to the configured target.
///
/// Headers are validated once at construction; `post` never fails, it reports a
/// [`ForwardOutcome`].
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpDispatcher {
    pub fn new(client: reqwest::Client, config: &Config) -> Result<Self, ForwarderError> {
        let headers = build_headers(
            &config.http_extra_headers,
            config.http_bearer_token.as_deref(),
        )?;
        Ok(Self {
            client,
            url: config.http_target_url.clone(),
            headers,
        })
    }

    /// POSTs the payload. Non-2xx responses are failures, like transport errors.
    pub async fn post(&self, payload: &ForwardPayload) -> ForwardOutcome {
        let result = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(payload.to_json())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                debug!("HTTP target answered {}", status_code);
                ForwardOutcome::Success { status_code }
            }
            Err(e) => ForwardOutcome::Failure {
                error: error_chain(&e),
            },
        }
    }
}
