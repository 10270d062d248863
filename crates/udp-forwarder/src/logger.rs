// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local log line format.
//!
//! ```text
//! UDP_FORWARDER | LEVEL | [(target)] [span{fields}>span{fields}: ]message fields
//! ```
//!
//! Events from the forwarder crates carry no target; events from dependencies (reqwest,
//! hyper, ...) are tagged with theirs so they can be told apart from forwarder output:
//!
//! ```text
//! UDP_FORWARDER | INFO | Forwarded UDP message to HTTP server status_code=200 msg_counter=4
//! UDP_FORWARDER | WARN | (reqwest::connect) proxy connection failed
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_PREFIX: &str = "UDP_FORWARDER";

// Shared by the library and the udp_forwarder_compat binary
const OWN_TARGET_PREFIX: &str = "udp_forwarder";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

fn is_own_target(target: &str) -> bool {
    target.starts_with(OWN_TARGET_PREFIX)
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(writer, "{LOG_PREFIX} | {} | ", metadata.level())?;

        if !is_own_target(metadata.target()) {
            write!(writer, "({}) ", metadata.target())?;
        }

        if let Some(scope) = ctx.event_scope() {
            let mut spans = scope.from_root().peekable();
            while let Some(span) = spans.next() {
                write!(writer, "{}", span.name())?;
                if let Some(fields) = span.extensions().get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                let separator = if spans.peek().is_some() { ">" } else { ": " };
                write!(writer, "{separator}")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
