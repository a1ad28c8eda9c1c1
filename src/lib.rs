//! # flowbus: declarative event-stream composition
//!
//! Attach to an event producer, then describe what should happen to its
//! messages as a chain of operators instead of nested callbacks and
//! hand-written accumulator state.
//!
//! ## Architecture
//!
//! - **Stages**: one operator each (filter, transform, name, run, keep, hold,
//!   group, delay), forwarding synchronously and depth-first to their children
//! - **Bus**: fluent builder that appends frames of stages and wires them
//!   (chain, merge, fork, add)
//! - **Scheduler**: per-runtime queue of batched stages, drained generation by
//!   generation with a feedback-loop limit
//! - **Timers**: the only deferral capability; virtual time for tests, tokio
//!   `LocalSet` tasks in applications
//!
//! Everything is single-threaded. A [`Runtime`] ties a scheduler and a timer
//! queue together and is passed to every stage that needs them.
//!
//! ## Example
//!
//! ```ignore
//! use flowbus::{Bus, BusConfig, Emitter, Runtime};
//! use std::rc::Rc;
//!
//! fn main() -> flowbus::Result<()> {
//!     let (runtime, _timers) = Runtime::manual(BusConfig::default());
//!     let clicks = Rc::new(Emitter::new());
//!
//!     let mut bus = Bus::from_event(&runtime, clicks.clone(), "click", false);
//!     bus.skip_dupes()?
//!         .hold()?
//!         .all()?
//!         .batch()?
//!         .run(|value, _, _| println!("burst: {value}"))?;
//!
//!     clicks.emit("click", 1)?;
//!     clicks.emit("click", 2)?;
//!     runtime.flush()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;

// Re-export commonly used types
pub use config::{BusConfig, LogSettings, SchedulerSettings};
pub use error::{BusError, Result, ResultExt};
pub use pipeline::{
    Buffer, Bus, Emitter, Envelope, EventSource, Keep, Operator, Stage, StageId, Value,
};
pub use runtime::Runtime;
pub use scheduler::{LocalTimers, ManualTimers, Scheduler, Timers};
