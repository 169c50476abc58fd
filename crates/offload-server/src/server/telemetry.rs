//! Log subscriber initialization.
//!
//! Events are filtered by `RUST_LOG` (default `info`) and written to stdout
//! by a `tracing_subscriber::fmt` layer, either pretty-printed or as JSON.
//!
//! ```bash
//! RUST_LOG=offload_core=trace,tower_http=debug cargo run -- --log-format json
//! ```

use crate::server::config::LogFormat;
use tracing_subscriber::{
    EnvFilter, fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt,
};

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    let layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(ChronoLocal::rfc_3339())
        .with_file(true);

    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Json => registry.with(layer.json()).try_init()?,
    }

    Ok(())
}
