#![allow(dead_code)]

use std::sync::Once;

/// Initialise tracing once for the whole test binary; level comes from
/// `RUST_LOG` so failing runs can be re-run with debug output.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
