use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Installs the `fmt` subscriber shared by the binaries. `RUST_LOG` takes
/// precedence over `default_filter` when it is set.
pub fn initialize(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_target(false)
        .init();
}

/// Like [`initialize`], but later calls are ignored, as is a subscriber that
/// some other harness already installed. Every test suite logs through this.
pub fn initialize_reentrant(default_filter: &str) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(default_filter))
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_reentrant() {
        initialize_reentrant("debug");
        initialize_reentrant("info");
        tracing::info!("still logging");
        assert!(tracing::dispatcher::has_been_set());
    }
}
