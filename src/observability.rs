//! Structured logging initialization.
//!
//! Library code logs through the `log` facade; the binary installs a
//! tracing subscriber (with the log bridge) controlled by `RUST_LOG`,
//! defaulting to `warn`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // Route `log` records from the library into the subscriber.
    let _ = tracing_log::LogTracer::init();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
