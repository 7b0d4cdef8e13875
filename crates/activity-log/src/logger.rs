//! Custom tracing formatter for activity-log service output.
//!
//! Every line is prefixed with `ACTIVITY_LOG` so the service's own diagnostics
//! are easy to tell apart from the access and audit records it stores.
//!
//! # Format
//!
//! ```text
//! ACTIVITY_LOG | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! # Examples
//!
//! ```text
//! ACTIVITY_LOG | INFO | Listening on 0.0.0.0:8080
//! ACTIVITY_LOG | WARN | RATE_LIMIT | Too many requests from 10.0.0.7, retry after 6s
//! ACTIVITY_LOG | ERROR | ACTIVITY_LOG | Failed to write batch of 10 records, dropping: Write failed
//! ```
//!
//! Components put their own tag (`ACTIVITY_LOG |`, `RATE_LIMIT |`) at the start
//! of the message, so the line prefix stays fixed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use activity_log::logger::Formatter;
//! use tracing_subscriber::EnvFilter;
//!
//! let subscriber = tracing_subscriber::fmt::Subscriber::builder()
//!     .with_env_filter(EnvFilter::new("info"))
//!     .event_format(Formatter)
//!     .finish();
//!
//! tracing::subscriber::set_global_default(subscriber)?;
//! ```
//!
//! # Span Context
//!
//! Active spans are printed root first, each followed by its recorded fields
//! in curly braces `{field=value}` when it has any.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Event formatter that prefixes every line with `ACTIVITY_LOG` and the level.
#[derive(Debug, Clone, Copy, Default)]
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
        let metadata = event.metadata();
        write!(&mut writer, "ACTIVITY_LOG | {} | ", metadata.level())?;

        // spans from root to leaf
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span, warn};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_format_prefix_level_and_spans() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .event_format(Formatter)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            info!("service started");
            let span = info_span!("request", path = "/logs");
            let _guard = span.enter();
            warn!(status = 429, "RATE_LIMIT | limited");
        });

        let output = captured.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "ACTIVITY_LOG | INFO | service started");
        assert!(lines[1].starts_with("ACTIVITY_LOG | WARN | request{path=\"/logs\"}: "));
        assert!(lines[1].contains("RATE_LIMIT | limited"));
        assert!(lines[1].contains("status=429"));
    }
}
