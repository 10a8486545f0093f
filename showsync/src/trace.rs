//! Logging for the controller threads.
//!
//! Built on `tracing` behind the `tracing` feature (on by default). With the
//! feature disabled every macro expands to nothing, so the hot loops carry no
//! logging cost at all.

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `showsync=info`.
/// Calling it a second time is harmless; the later call is ignored.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("showsync=info"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

// A single swallowing macro stands in for every level.
#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {discard as debug, discard as error, discard as info, discard as trace, discard as warn};
