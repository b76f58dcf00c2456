//! # relay-logging
//!
//! Structured logging with `tracing`.
//!
//! Installs a global subscriber with an `EnvFilter` (`RUST_LOG` wins over the
//! configured level) and either human-readable or JSON line output.

#![deny(unsafe_code)]

use relay_settings::{LogFormat, LoggingSettings};
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors from subscriber installation.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` if set and valid, otherwise `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Subscriber for the window before settings are loaded.
///
/// Writes warnings to stderr; use it with
/// [`tracing::subscriber::with_default`] around settings loading.
pub fn bootstrap_subscriber() -> impl Subscriber + Send + Sync + 'static {
    bootstrap_subscriber_with_writer(std::io::stderr)
}

fn bootstrap_subscriber_with_writer<W>(writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(build_filter("warn"))
        .with_writer(writer)
        .with_target(false)
        .finish()
}

/// Install the global subscriber, failing if one already exists.
pub fn try_init_subscriber(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(&settings.level);

    let fmt_layer = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    Ok(())
}

/// Install the global subscriber, ignoring an already-installed one.
pub fn init_subscriber(settings: &LoggingSettings) {
    if let Err(e) = try_init_subscriber(settings) {
        eprintln!("relay-logging: {e}");
    }
}
