// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection for the Datadog log mirror

use std::env;
use tracing::warn;

/// Get the hostname reported to the Datadog log intake
///
/// Resolution order:
/// 1. DATADOG_HOSTNAME environment variable (if set)
/// 2. HOSTNAME environment variable
/// 3. System hostname
/// 4. "unknown"
#[must_use]
pub fn get_hostname() -> String {
    for var in ["DATADOG_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            let hostname = hostname.trim();
            if !hostname.is_empty() {
                return hostname.to_string();
            }
        }
    }

    match hostname::get() {
        Ok(hostname_osstr) => {
            if let Some(hostname_str) = hostname_osstr.to_str() {
                if !hostname_str.is_empty() {
                    return hostname_str.to_string();
                }
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}
