//! Log subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. JSON output flattens
/// event fields so weight transitions can be grepped by address.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}
