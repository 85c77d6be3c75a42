//! Log output for embedders.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Install a stderr subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Returns false when a global
/// subscriber was already installed (by us or by the host process).
pub fn init_logging(default_filter: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr);

    Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
        .is_ok()
}
