//! Tracing initialization and configuration.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the metastore tracing/logging system.
///
/// Reads the `METASTORE_LOG` environment variable for per-module log levels,
/// e.g. `METASTORE_LOG=metastore_storage::migrations=debug,info`.
///
/// Falls back to `metastore=info` when `METASTORE_LOG` is unset or invalid.
/// Calling it more than once is a no-op.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("METASTORE_LOG")
            .unwrap_or_else(|_| EnvFilter::new("metastore=info"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    });
}
