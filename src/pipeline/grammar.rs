//! Configuration grammar for the fluent builder.
//!
//! The cursor group is either `Open` (every operator appends a new group) or
//! `Holding` (a hold/group stage is being configured and forwarding is
//! deferred until a release is attached). The accepted sentence is
//!
//! ```text
//! (hold | group) [ready] [first | last | all] [clear] [batch | defer]
//! ```
//!
//! [`transition`] is the whole table: the builder asks it once per call and
//! acts on the returned [`Action`].

use crate::error::{BusError, Result};
use std::fmt;

/// Configuration state of a stage group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupState {
    #[default]
    Open,
    Holding,
}

/// Every builder operator, as seen by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Filter,
    Transform,
    Name,
    Run,
    SkipDupes,
    Delay,
    Hold,
    Group,
    First,
    Last,
    All,
    Ready,
    Clear,
    Batch,
    Defer,
    Merge,
    Fork,
    Add,
    AddEvent,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Filter => "filter",
            Verb::Transform => "transform",
            Verb::Name => "name",
            Verb::Run => "run",
            Verb::SkipDupes => "skip_dupes",
            Verb::Delay => "delay",
            Verb::Hold => "hold",
            Verb::Group => "group",
            Verb::First => "first",
            Verb::Last => "last",
            Verb::All => "all",
            Verb::Ready => "ready",
            Verb::Clear => "clear",
            Verb::Batch => "batch",
            Verb::Defer => "defer",
            Verb::Merge => "merge",
            Verb::Fork => "fork",
            Verb::Add => "add",
            Verb::AddEvent => "add_event",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the builder must do for an accepted operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Append a new group wired 1:1 from the cursor group.
    Extend,
    /// Reconfigure the cursor group in place.
    Modify,
    /// Reconfigure the cursor group in place and leave the holding state.
    Release,
    /// Append a single-stage group fed by every cursor stage.
    Merge,
    /// Start an independent builder fed by the cursor group.
    Fork,
    /// Append a group fed by the cursor group and another builder.
    Join,
}

/// Decide how `verb` applies in `state`, or reject it.
pub fn transition(state: GroupState, verb: Verb) -> Result<Action> {
    use GroupState::{Holding, Open};

    match (state, verb) {
        (Open, Verb::Ready | Verb::Clear) => Err(BusError::NotHolding { operator: verb }),
        (Open, Verb::Merge) => Ok(Action::Merge),
        (Open, Verb::Fork) => Ok(Action::Fork),
        (Open, Verb::Add | Verb::AddEvent) => Ok(Action::Join),
        (Open, _) => Ok(Action::Extend),

        (Holding, Verb::First | Verb::Last | Verb::All | Verb::Ready | Verb::Clear) => {
            Ok(Action::Modify)
        }
        (Holding, Verb::Batch | Verb::Defer) => Ok(Action::Release),
        (Holding, _) => Err(BusError::Holding { operator: verb }),
    }
}

/// State of the cursor group after `action` was applied for `verb`.
pub fn next_state(state: GroupState, verb: Verb, action: Action) -> GroupState {
    match action {
        Action::Release => GroupState::Open,
        Action::Modify => state,
        Action::Extend if matches!(verb, Verb::Hold | Verb::Group) => GroupState::Holding,
        _ => GroupState::Open,
    }
}
