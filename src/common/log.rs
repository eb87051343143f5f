//! Logging helpers
//!
//! This module wires the `log` facade to `env_logger`.

use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is
/// harmless; only the first call installs the logger.
///
/// # Parameters
///
/// * `level` - Default log level (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    LOGGER.get_or_init(|| {
        let env = env_logger::Env::default().filter_or("RUST_LOG", level);

        // Another logger may already be installed by the embedding application
        let _ = env_logger::Builder::from_env(env).try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_twice() {
        init_logger("debug");
        init_logger("trace");
        assert!(LOGGER.get().is_some());
    }
}
