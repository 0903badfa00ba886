//! Tracing setup shared by the services

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info` for everything and `debug`
/// for the service's own crate.
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{}=debug", service)));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        // Already installed, e.g. by a test harness
        return;
    }

    info!("Logging initialized for {}", service);
}
