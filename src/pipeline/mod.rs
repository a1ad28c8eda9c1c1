//! Stage-based event pipelines.
//!
//! Messages enter at source stages (usually bound to an [`EventSource`]),
//! run through one operator per stage and fan out to child stages. A [`Bus`]
//! builds such graphs fluently, one [`Frame`] of parallel stages at a time.
//!
//! # Architecture
//!
//! ```text
//! [EventSource] ──► [source Stage] ──► [filter] ──► [hold] ─ ─ ─► [run]
//!                                          │          (batch: released by the Scheduler)
//!                                          └──► [fork ...]
//! ```
//!
//! # Design
//!
//! - **Closed operator set**: [`Operator`] is an enum dispatched by `match`.
//! - **Forward-only wiring**: stages hold `Weak` children; frames own stages.
//! - **Explicit grammar**: `Open`/`Holding` transitions live in [`grammar`].
//! - **Single-threaded**: `Rc`/`RefCell` throughout; deferral goes through
//!   the runtime's [`Timers`](crate::scheduler::Timers).

pub mod bus;
pub mod frame;
pub mod grammar;
pub mod id;
pub mod keep;
pub mod operator;
pub mod packet;
pub mod source;
pub mod stage;

pub use bus::Bus;
pub use frame::Frame;
pub use grammar::{Action, GroupState, Verb};
pub use id::{StageId, SubscriptionId};
pub use keep::{Buffer, Keep};
pub use operator::{DelaySpec, HoldConfig, Operator, Release};
pub use packet::{Envelope, Value};
pub use source::{event_stage, Emitter, EventSource, Listener};
pub use stage::{Cleanup, Stage};
