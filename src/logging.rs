//! Diagnostic logging setup.
//!
//! Logs always go to stderr so stdout stays reserved for command output.
//! `JTRACK_LOG` takes any `EnvFilter` directive and wins over `-v`/`-q`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding an explicit filter directive.
pub const LOG_ENV: &str = "JTRACK_LOG";

/// Default level for a given verbosity.
///
/// Warnings are shown unless `quiet`; each `-v` adds one level.
pub fn level_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init_logging(verbose: u8, quiet: bool, json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("jtrack={}", level_for(verbose, quiet))));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialised");
    }
}
