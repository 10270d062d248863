// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort mirroring of lifecycle events to a remote log sink.
//!
//! The forwarder always holds an `Arc<dyn LogMirror>`; when no remote sink is configured it
//! holds a [`NoopMirror`], so callers never check whether mirroring is enabled.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub type LogContext = Map<String, Value>;

/// Level of a mirrored entry: `ERROR` when an error is attached, `INFO` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorLevel {
    Info,
    Error,
}

impl MirrorLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
        }
    }
}

/// One lifecycle event to mirror
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntry {
    pub message: String,
    pub context: LogContext,
    pub error: Option<String>,
}

impl MirrorEntry {
    pub fn new(message: &str, context: LogContext) -> Self {
        Self {
            message: message.to_string(),
            context,
            error: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn level(&self) -> MirrorLevel {
        if self.error.is_some() {
            MirrorLevel::Error
        } else {
            MirrorLevel::Info
        }
    }
}

#[async_trait]
pub trait LogMirror: Send + Sync {
    /// Whether entries actually leave the process
    fn enabled(&self) -> bool;

    /// Mirrors one entry. Implementations handle their own failures and never panic.
    async fn mirror(&self, entry: MirrorEntry);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMirror;

#[async_trait]
impl LogMirror for NoopMirror {
    fn enabled(&self) -> bool {
        false
    }

    async fn mirror(&self, _entry: MirrorEntry) {}
}

/// Mirrors `entry` on a separate task so the caller never waits on the remote sink.
pub fn spawn_mirror(mirror: &Arc<dyn LogMirror>, entry: MirrorEntry) {
    if !mirror.enabled() {
        return;
    }
    let mirror = Arc::clone(mirror);
    tokio::spawn(async move {
        mirror.mirror(entry).await;
    });
}
