//! Utility modules

pub mod memory_storage;
pub mod validation;

pub use memory_storage::*;
pub use validation::*;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a global fmt subscriber honoring `RUST_LOG`
///
/// Safe to call more than once; only the first call installs anything.
///
/// ```
/// use card_ledger_core::utils::init_tracing;
///
/// init_tracing();
/// init_tracing();
/// tracing::debug!("subscriber already installed");
/// ```
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = match "card_ledger_core=info".parse() {
            Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
            Err(_) => EnvFilter::from_default_env(),
        };

        // Another subscriber may already be installed by the host application.
        let _ = fmt().with_env_filter(filter).try_init();
        tracing::info!("card ledger tracing initialized");
    });
}
