//! Per-module debug loggers.
//!
//! Controlled through the DEBUG environment variable:
//! - `DEBUG=*` - enable every logger
//! - `DEBUG=dwarf` - enable one module
//! - `DEBUG=dwarf,objfile` - enable several
//!
//! DEBUG_VERBOSITY (0-2, default 1) gates the detail level.

use std::collections::HashSet;
use std::env;
use std::sync::OnceLock;

enum Enabled {
    All,
    None,
    Named(HashSet<String>),
}

struct Config {
    enabled: Enabled,
    verbosity: u8,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        let enabled = match env::var("DEBUG").ok().as_deref() {
            None | Some("") => Enabled::None,
            Some("*") | Some("1") | Some("true") => Enabled::All,
            Some(value) => {
                let names: HashSet<_> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if names.is_empty() {
                    Enabled::None
                } else {
                    Enabled::Named(names)
                }
            }
        };
        let verbosity = env::var("DEBUG_VERBOSITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(|v: u8| v.min(2))
            .unwrap_or(1);
        Config { enabled, verbosity }
    })
}

fn is_enabled(name: &str) -> bool {
    match &config().enabled {
        Enabled::None => false,
        Enabled::All => true,
        Enabled::Named(names) => names.contains(name),
    }
}

/// A named logger. Cheap to hold; does nothing unless its module was named
/// in DEBUG at process start.
pub struct Logger {
    name: &'static str,
    enabled: bool,
}

impl Logger {
    pub const fn disabled() -> Self {
        Self { name: "", enabled: false }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn log(&self, msg: &str) {
        if self.enabled && config().verbosity >= 1 {
            eprintln!("[{}] {}", self.name, msg);
        }
    }

    #[inline]
    pub fn detail(&self, msg: &str) {
        if self.enabled && config().verbosity >= 2 {
            eprintln!("[{}] {}", self.name, msg);
        }
    }
}

/// Create a logger. The name must be a static string.
pub fn create_logger(name: &'static str) -> Logger {
    Logger { name, enabled: is_enabled(name) }
}

// Macros keep the format! cost out of the disabled path.

#[macro_export]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.log(&format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_detail {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.detail(&format!($($arg)*));
        }
    };
}
