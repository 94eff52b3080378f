//! Tracing subscriber setup
//!
//! A single subscriber is installed at startup: an env filter (`RUST_LOG`,
//! falling back to a crate-level debug default) and one fmt layer, either
//! JSON lines or human readable.

use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LogFormat};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "putio_fetch=debug,tower_http=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_tracing(config: &Config) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt_layer(config.log_format))
        .with(env_filter())
        .try_init()?;
    Ok(())
}
