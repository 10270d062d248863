// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Encoding of raw datagram payloads into the forward request body.
//!
//! The receiving endpoint expects standard base64 with `+` replaced by `-`, `/` replaced by
//! `_` and every `=` stripped, wrapped as `{"msg": "<encoded>"}`.

use base64::{engine::general_purpose, Engine};
use serde::Serialize;

/// JSON envelope POSTed for every datagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardPayload {
    pub msg: String,
}

impl ForwardPayload {
    #[must_use]
    pub fn new(payload: &[u8]) -> Self {
        Self {
            msg: base64_encode_url(payload),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        // A struct with a single string field always serializes
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"msg\":\"{}\"}}", self.msg))
    }
}

/// Encodes bytes as URL-safe base64 without padding.
#[must_use]
pub fn base64_encode_url(payload: &[u8]) -> String {
    general_purpose::STANDARD
        .encode(payload)
        .chars()
        .filter_map(|c| match c {
            '+' => Some('-'),
            '/' => Some('_'),
            '=' => None,
            other => Some(other),
        })
        .collect()
}
