//! Tracing subscriber setup for the `tasaverde` binary

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Filter for our own events and the HTTP client underneath them.
///
/// Quiet runs still show warnings, since best-effort failures such as a
/// rejected provider sign-out are only reported there. Verbose runs add the
/// request-level events from `reqwest`.
fn app_targets(verbose: bool) -> Targets {
    if verbose {
        Targets::new()
            .with_target("tasaverde", LevelFilter::DEBUG)
            .with_target("reqwest", LevelFilter::DEBUG)
    } else {
        Targets::new().with_target("tasaverde", LevelFilter::WARN)
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time())
        .with(app_targets(verbose))
        .with(env_filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_quiet_keeps_warnings() {
        let targets = app_targets(false);
        assert!(targets.would_enable("tasaverde::auth", &Level::WARN));
        assert!(!targets.would_enable("tasaverde::core::cache", &Level::DEBUG));
        assert!(!targets.would_enable("reqwest::connect", &Level::DEBUG));
    }

    #[test]
    fn test_verbose_includes_http_client() {
        let targets = app_targets(true);
        assert!(targets.would_enable("tasaverde::core::cache", &Level::DEBUG));
        assert!(targets.would_enable("reqwest::connect", &Level::DEBUG));
        assert!(!targets.would_enable("hyper_util", &Level::DEBUG));
    }
}
