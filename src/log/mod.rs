//! Log level control
//!
//! Holds the process-wide log level and, when the binary installed one, the
//! `tracing_subscriber` reload handle that swaps the live filter.

use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Handle for replacing the active filter at runtime
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Log level (mihomo naming)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    /// `EnvFilter` directive for this level
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "off",
        }
    }

    pub fn filter(&self) -> EnvFilter {
        EnvFilter::new(self.directive())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for LogLevel {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            _ => Err(Error::config(format!("Unknown log level: {}", s))),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        LogLevel::try_from(s.as_str())
    }
}

impl From<LogLevel> for &'static str {
    fn from(level: LogLevel) -> Self {
        level.as_str()
    }
}

/// Current log level plus the optional live-filter handle
pub struct LogController {
    level: RwLock<LogLevel>,
    handle: Option<FilterHandle>,
}

impl LogController {
    pub fn new(level: LogLevel, handle: Option<FilterHandle>) -> Self {
        LogController {
            level: RwLock::new(level),
            handle,
        }
    }

    pub fn level(&self) -> LogLevel {
        *self.level.read()
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.level.write() = level;

        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(level.filter()) {
                warn!("Failed to reload log filter: {}", e);
                return;
            }
        }
        info!("Log level set to {}", level);
    }
}

impl Default for LogController {
    fn default() -> Self {
        Self::new(LogLevel::default(), None)
    }
}
