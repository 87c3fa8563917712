//! Diagnostics setup.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const DEBUG_ENV_VAR: &str = "CTF_FS_DEBUG";

static DEBUG: OnceLock<bool> = OnceLock::new();

/// Whether `CTF_FS_DEBUG=1` was set. The environment is read on first call
/// only.
pub fn debug_enabled() -> bool {
    *DEBUG.get_or_init(|| std::env::var(DEBUG_ENV_VAR).is_ok_and(|v| v == "1"))
}

fn default_level(verbose: bool) -> &'static str {
    if debug_enabled() {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over the
/// level picked from `CTF_FS_DEBUG` and `verbose`.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

    // A second call, e.g. from tests, keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
