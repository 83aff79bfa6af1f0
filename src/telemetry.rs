//! Logging setup
//!
//! Installs a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back to
//! the directive passed in.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const DEFAULT_DIRECTIVE: &str = "knowledge_resolver=info";

/// Initialize the global subscriber. Returns false if one was already set,
/// which is normal when several tests share a process.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    Registry::default()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .try_init()
        .is_ok()
}
