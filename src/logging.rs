//! Structured logging on stderr.
//!
//! `RUST_LOG` wins when set. Otherwise the filter is
//! `plotline=info,plotline_core=info`, or `debug` for both with `--verbose`.
//! Stdout stays reserved for command output so `--json` can be piped.

use tracing_subscriber::EnvFilter;

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "plotline=debug,plotline_core=debug,tower_http=debug"
    } else {
        "plotline=info,plotline_core=info"
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
