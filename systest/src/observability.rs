//! Logging setup for the systest binary

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Default filter when `RUST_LOG` is unset
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("systest={0},systest_core={0},systest_testbed={0}", level)
}

/// Install the global subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(verbose)
        .with_line_number(verbose);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Span covering one CLI command against the testbed
#[inline]
pub fn command_span(command: &str, testbed: &str) -> Span {
    tracing::info_span!(
        "systest",
        command = %command,
        testbed = %testbed,
    )
}
