//! Logging setup for discdrawer.
//!
//! Events are emitted with `tracing` throughout the crate; this module
//! installs the `tracing-subscriber` formatter used by the `ddraw` binary.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Info and above.
    #[default]
    Normal,
    /// Debug and above.
    Verbose,
    /// Everything, including per-fix trace events.
    Trace,
}

impl Verbosity {
    /// The most detailed level shown at this verbosity.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// The default filter directive for this verbosity.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        format!("discdrawer={}", self.to_level_filter())
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over `verbosity` when set. Calling this more
/// than once keeps the first subscriber.
///
/// # Examples
///
/// ```no_run
/// use discdrawer::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    // interactive output goes to stdout, keep logs on stderr
    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    let _ = subscriber.try_init();
}

/// Initialize logging for tests, warnings and errors only.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
