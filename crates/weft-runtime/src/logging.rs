//! Structured logging with tracing
//!
//! Thin bootstrap over `tracing-subscriber` for binaries and tests that
//! embed the engine. Filtering is controlled through the `WEFT_LOG`
//! environment variable (standard `EnvFilter` syntax), defaulting to
//! `info`.

use tracing_subscriber::EnvFilter;

use weft_domain::{Error, Result};

/// Initialize the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env("WEFT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| Error::internal(format!("failed to install tracing subscriber: {err}")))
}

/// Initialize logging for tests; an already-installed subscriber is fine.
pub fn init_test_logging() {
    let _ = init_logging();
}
