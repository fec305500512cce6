use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "PRACTICE_LOG";
const DEFAULT_FILTER: &str = "speaking_practice=info,practice_coach=info";

static INIT: Once = Once::new();

/// Installs the global subscriber once. Filters come from `PRACTICE_LOG`,
/// e.g. `PRACTICE_LOG=speaking_practice::pipeline=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}
