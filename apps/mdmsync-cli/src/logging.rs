//! Tracing subscriber setup.
//!
//! JSON lines for log shipping or compact text for a terminal. Everything is
//! written to stderr so `--json` output on stdout stays parseable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogFormat;

/// `RUST_LOG` wins; `fallback` applies when it is unset or invalid.
fn build_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|e| {
            eprintln!("Ignoring log filter '{fallback}': {e}");
            EnvFilter::new("info")
        })
}

/// Install the global subscriber. Must be called once per process.
pub fn init_logging(filter: &str, format: LogFormat) {
    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .flatten_event(true)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(build_filter(filter)))
        .init();

    tracing::debug!(filter, format = format.as_str(), "Logging initialized");
}
