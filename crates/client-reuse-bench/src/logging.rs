//! Logging utilities and defaults.

use std::env;
use std::str::FromStr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Installs a [`tracing`] subscriber writing to stderr, so stdout only carries
/// the benchmark report.
pub fn initialize_logging() -> anyhow::Result<()> {
    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_rust_log_value());
    let filter = EnvFilter::from_str(&env_filter)
        .with_context(|| format!("Invalid `RUST_LOG` value `{env_filter}`"))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    info!(
        RUST_LOG = env_filter,
        "Logging initialized; set the `RUST_LOG` env. var. to customize log filtering"
    );
    set_tracing_panic_hook();
    Ok(())
}

/// A good default for [`EnvFilter`] when `RUST_LOG` is not set.
pub fn default_rust_log_value() -> String {
    [
        "info", // Default logging level.
        // Per-worker and per-snapshot events:
        // "concurrent_bench=debug",
        // Warn-only:
        "h2=warn",
        "hyper=warn",
        "hyper_util=warn",
        "reqwest=warn",
        "rustls=warn",
    ]
    .join(",")
}

/// Adds [`tracing_panic::panic_hook`] to the panic hook.
pub fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing_panic::panic_hook(panic_info);
        prev_hook(panic_info);
    }));
}
