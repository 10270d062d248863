// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Relays UDP datagrams to an HTTP endpoint, one POST per datagram.
//!
//! Each datagram is assigned an arrival-ordered sequence number, encoded as URL-safe
//! unpadded base64 inside a `{"msg": ...}` JSON envelope and posted to the configured
//! target without blocking the receive loop. Lifecycle events can optionally be mirrored
//! to the Datadog HTTP log intake.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod datadog_logger;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod forwarder;
pub mod hostname;
pub mod http_client;
pub mod listener;
pub mod logger;
pub mod mirror;

pub use config::{Config, DatadogLoggerConfig};
pub use error::ForwarderError;
pub use forwarder::{Forwarder, RunningForwarder};
