//! Logging setup and the prelude used throughout the crate.
//!
//! Modules pull the usual macros in with
//! `use crate::tracing::prelude::*;` so the call sites stay uniform.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Logs go to stderr with local timestamps. When the systemd journal is
/// reachable a journald layer is added as well, so the daemon can run
/// as a user service without losing structured fields.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::LocalTime::rfc_3339());

    let journald = tracing_journald::layer().ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(journald)
        .init();
}
