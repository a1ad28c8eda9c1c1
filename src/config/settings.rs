//! Settings sections of [`BusConfig`](super::BusConfig)
//!
//! # Main Types
//!
//! - [`SchedulerSettings`] - Flush scheduler limits and auto-flush timing
//! - [`LogSettings`] - Log filter and optional log file

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of drain generations before a flush is declared a feedback loop
pub const DEFAULT_MAX_GENERATIONS: usize = 10;

/// Default log filter when neither the config nor `RUST_LOG` sets one
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Flush scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Drain generations allowed in one flush
    pub max_generations: usize,

    /// Schedule a flush on the runtime timers when the first stage is queued
    pub auto_flush: bool,

    /// Delay before an automatically scheduled flush runs, in milliseconds
    pub flush_delay_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_generations: DEFAULT_MAX_GENERATIONS,
            auto_flush: true,
            flush_delay_ms: 0,
        }
    }
}

impl SchedulerSettings {
    /// Delay before an automatically scheduled flush
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    /// Settings for callers that drive `flush` themselves
    pub fn manual() -> Self {
        Self {
            auto_flush: false,
            ..Self::default()
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub filter: String,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
        }
    }
}
