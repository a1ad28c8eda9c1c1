//! Identity types for the pipeline system.
//!
//! Stage ids are handed out by the owning [`Runtime`](crate::runtime::Runtime)
//! in creation order and are only used for diagnostics.

use std::fmt;

/// Identifier of a [`Stage`](crate::pipeline::Stage), unique per runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct StageId(pub u32);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// Handle returned by [`EventSource::subscribe`](crate::pipeline::EventSource::subscribe),
/// used to unsubscribe the same listener later.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}
