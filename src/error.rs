//! Error handling for flowbus
//!
//! Configuration-time contract violations (`Holding`, `NotHolding`,
//! `Destroyed`) and the batch feedback-loop detection (`BatchCycle`) are
//! programmer errors: they are returned at the call site and must not be
//! retried.
//!
//! Failures raised by user-supplied operator functions are wrapped in
//! [`BusError::Operator`] and propagated unchanged to whoever called
//! `accept` (an adapter, a timer task, or a flush drain). Propagation stops
//! the forward chain where the error happened: siblings that were not yet
//! visited do not receive the message. Nothing in the crate swallows these.

use crate::pipeline::grammar::Verb;
use crate::pipeline::id::StageId;
use thiserror::Error;

/// Main error type for flowbus operations
#[derive(Error, Debug)]
pub enum BusError {
    /// A structural or terminal operator was invoked while the cursor group
    /// is holding messages.
    #[error("`{operator}` cannot be invoked while holding messages")]
    Holding { operator: Verb },

    /// A hold-only operator was invoked with no open hold or group stage.
    #[error("`{operator}` requires an open hold or group stage")]
    NotHolding { operator: Verb },

    /// The flush loop did not settle within the generation limit.
    #[error("batch cycling loop exceeded {limit} generations ({pending} stages still queued)")]
    BatchCycle { limit: usize, pending: usize },

    /// Configuration call on a destroyed bus.
    #[error("bus has been destroyed")]
    Destroyed,

    /// A user-supplied operator function failed.
    #[error("operator failed in {stage}: {source}")]
    Operator {
        stage: StageId,
        #[source]
        source: anyhow::Error,
    },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BusError>,
    },
}

impl BusError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BusError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap a user function failure raised inside `stage`.
    pub fn operator(stage: StageId, source: anyhow::Error) -> Self {
        BusError::Operator { stage, source }
    }

    /// Whether this error (or the error it wraps) is a detected batch cycle.
    pub fn is_batch_cycle(&self) -> bool {
        match self {
            BusError::BatchCycle { .. } => true,
            BusError::WithContext { source, .. } => source.is_batch_cycle(),
            _ => false,
        }
    }
}

/// Result type alias for flowbus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
