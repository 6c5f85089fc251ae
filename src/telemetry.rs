//! Logging setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber at `level`.
///
/// `RUST_LOG` directives, when set, take precedence over `level`. Returns
/// `false` if a subscriber was already installed, so tests may call this
/// repeatedly.
pub fn init_tracing(level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
