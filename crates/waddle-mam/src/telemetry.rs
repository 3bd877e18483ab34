//! Tracing subscriber setup for binaries embedding the archive module.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable multi-line output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Initialize the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info,waddle_mam=debug`.
pub fn init(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,waddle_mam=debug"));

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .json(),
            )
            .try_init()?,
    }

    tracing::debug!(?format, "Telemetry initialized");
    Ok(())
}
