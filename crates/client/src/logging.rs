//! Logging setup and macros.
//!
//! Client code logs through `log_info!`, `log_warn!`, `log_error!` and
//! `log_debug!`, which forward to `tracing`. Binaries call [`init`] once.

pub use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "chatline_client=debug";

/// Install the global `tracing` subscriber. Safe to call more than once; only
/// the first call takes effect.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[doc(hidden)]
pub fn emit(level: Level, msg: &str) {
    match level {
        Level::ERROR => tracing::error!("{}", msg),
        Level::WARN => tracing::warn!("{}", msg),
        Level::INFO => tracing::info!("{}", msg),
        Level::DEBUG => tracing::debug!("{}", msg),
        _ => tracing::trace!("{}", msg),
    }
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::INFO, &format!($($arg)*))
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::ERROR, &format!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::WARN, &format!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::DEBUG, &format!($($arg)*))
    };
}
