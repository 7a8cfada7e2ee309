//! `tracing` subscriber setup for the `fh` binary.
//!
//! Logs go to stderr so stdout stays parseable. The `FILEHOUND_LOG`
//! environment variable takes an `EnvFilter` directive
//! (e.g. `FILEHOUND_LOG=filehound=debug`); `--verbose` forces `debug`.
//! Without either, the level is `info`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FILEHOUND_LOG";

/// Build the filter for the given verbosity.
pub fn build_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(verbose: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
