// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Formatting of the shipper's own diagnostics.
//!
//! Lines look like:
//!
//! ```text
//! LOG_SHIPPER | WARN | BULK | Backend accepted a bulk of 3 documents but rejected some of them
//! LOG_SHIPPER | DEBUG | worker{id=1}: SHIPPER | Worker drained the queue
//! ```
//!
//! They are easy to tell apart from the application's own output when both
//! end up on the same stream.

use std::fmt;

use tracing::subscriber::SetGlobalDefaultError;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the level passed to [`init`].
pub const LOG_LEVEL_ENV: &str = "LOG_SHIPPER_LOG_LEVEL";

/// Event formatter prefixing every line with `LOG_SHIPPER | LEVEL | `.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

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
        write!(&mut writer, "LOG_SHIPPER | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs a global subscriber using [`Formatter`].
///
/// `level` is an `EnvFilter` directive such as `"info"` or
/// `"elastic_log_shipper=debug"`; [`LOG_LEVEL_ENV`] takes precedence when set.
/// HTTP stack internals are silenced. Fails if a global subscriber is
/// already installed.
pub fn init(level: &str) -> Result<(), SetGlobalDefaultError> {
    let directive = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| level.to_string());
    let env_filter = EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{directive}"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
