#![deny(missing_docs)]
//! Shared logging utilities for the importer workspace.
//!
//! This crate provides the `importer_*` logging macros used across the
//! codebase and a minimal test initializer for the global logger. The binary
//! installs its own file/terminal logger; library crates only ever go through
//! these macros.

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! importer_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! importer_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! importer_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! importer_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! importer_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Returns the level filter used by [`initialize_for_tests`].
///
/// Debug builds log at debug level so state transitions show up in failing
/// test output; release builds stay at info.
pub fn test_level() -> log::LevelFilter {
    if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        test_level(),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
