// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can stop the forwarder from starting.
///
/// Per-message failures (HTTP dispatch, Datadog mirroring) are never represented here:
/// they are logged where they happen and never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Missing mandatory env var '{0}'")]
    MissingConfig(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid HTTP header: {0}")]
    InvalidHeader(String),

    #[error("Failed to bind UDP socket on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
