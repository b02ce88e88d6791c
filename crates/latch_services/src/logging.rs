//! Logging initialization

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

use crate::settings::{LogFormat, LoggingSettings};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter")]
    Filter(#[from] ParseError),
    #[error("a global subscriber is already installed")]
    Init(#[from] TryInitError),
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = env_filter(std::env::var("RUST_LOG").ok().as_deref(), &settings.level)?;

    let layer = tracing_subscriber::fmt::layer().with_target(true);
    let layer = match settings.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()?;
    Ok(())
}

fn env_filter(rust_log: Option<&str>, level: &str) -> Result<EnvFilter, ParseError> {
    match rust_log {
        Some(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(level),
    }
}
