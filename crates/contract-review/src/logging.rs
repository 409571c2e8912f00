//! Logging setup shared by the server and the CLI.
//!
//! Everything goes through `tracing`. The level comes from `-v`/`-q`, else
//! from `logging.level` in the config; `RUST_LOG` overrides both.

use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

use crate::model::ParseEnumError;

/// Crate target the default filter applies to.
const LOG_TARGET: &str = "contract_review";

/// How much the service logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only (`-q`, `error`).
    Quiet,
    /// Warnings and errors (`warn`).
    Warn,
    /// Request summaries and lifecycle events (`info`).
    #[default]
    Normal,
    /// Storage and conversion detail (`-v`, `debug`).
    Verbose,
    /// Everything (`-vv`, `trace`).
    Trace,
}

impl Verbosity {
    /// The most detailed level that is still emitted.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Map a configured level name, case-insensitively. Unknown names give `None`.
    #[must_use]
    pub fn from_level_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Quiet),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Normal),
            "debug" => Some(Self::Verbose),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[must_use]
    pub fn directive(self) -> String {
        format!("{LOG_TARGET}={}", self.level())
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Level prints uppercase; config files use lowercase.
        f.write_str(&self.level().to_string().to_ascii_lowercase())
    }
}

impl FromStr for Verbosity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_level_name(s).ok_or_else(|| ParseEnumError::new("log level", s))
    }
}

/// Install the global subscriber.
///
/// Later calls are no-ops, so tests may call it freely.
///
/// ```no_run
/// use contract_review::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Warn);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer::layer().with_target(true))
        .try_init();
}
