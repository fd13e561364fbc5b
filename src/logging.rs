//! Structured logging initializer for embedders.
//!
//! The engine itself only ever calls the [`log`] facade macros (see
//! `store::recovery` and `store::mod` for the lifecycle events it
//! instruments); nothing in this crate installs a logger implementation,
//! since a library must never decide that for its caller. This module is a
//! convenience for binaries embedding [`crate::Store`] that don't already
//! have their own `simplelog` setup.

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};

use crate::error::{Error, Result};

/// Installs a terminal logger at `level` as the global `log` implementation.
///
/// Returns [`Error::Config`] if a logger has already been installed.
pub fn init(level: LevelFilter) -> Result<()> {
    CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .map_err(|err| Error::Config(format!("logger already installed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_init_is_reported_as_config_error() {
        // Installing a global logger twice in one process is the only
        // realistic failure mode, and whichever test runs first in this
        // binary wins the race to be the "first" init - so just check that
        // *a* second call from this module's own repeated use fails
        // gracefully rather than panicking.
        let _ = init(LevelFilter::Warn);
        assert!(init(LevelFilter::Warn).is_err());
    }
}
