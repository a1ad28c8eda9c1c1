//! Operator configuration for a stage.
//!
//! Every stage runs exactly one [`Operator`]. Operators are a closed set,
//! dispatched by `match` in [`Stage::accept`](crate::pipeline::Stage::accept);
//! only the buffering variants (`Hold`, `Group`) are reconfigured after
//! construction, and only while their group is still holding.

use crate::pipeline::keep::{Buffer, Keep};
use crate::pipeline::packet::{Envelope, Value};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// `filter` predicate: `(value, source, last forwarded) -> pass?`
pub type FilterFn = Rc<dyn Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<bool>>;
/// `transform` function: `(value, source, last forwarded) -> replacement`
pub type TransformFn =
    Rc<dyn Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<Value>>;
/// `name` function: `(value, source, last forwarded) -> new source`
pub type RenameFn = Rc<dyn Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<String>>;
/// `run` side effect.
pub type RunFn = Rc<dyn Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<()>>;
/// Group key function.
pub type KeyFn = Rc<dyn Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<String>>;
/// Readiness predicate over the whole buffer.
pub type ReadyFn = Rc<dyn Fn(&Buffer, Option<&Envelope>) -> bool>;
/// Latch-clear predicate; `true` keeps the stage latched after a release.
pub type ClearFn = Rc<dyn Fn(&Buffer) -> bool>;

/// How long a `delay` stage waits before forwarding.
#[derive(Clone)]
pub enum DelaySpec {
    Fixed(Duration),
    Computed(Rc<dyn Fn() -> Duration>),
}

impl DelaySpec {
    pub fn duration(&self) -> Duration {
        match self {
            DelaySpec::Fixed(d) => *d,
            DelaySpec::Computed(f) => f(),
        }
    }
}

impl From<Duration> for DelaySpec {
    fn from(d: Duration) -> Self {
        DelaySpec::Fixed(d)
    }
}

/// Milliseconds.
impl From<u64> for DelaySpec {
    fn from(ms: u64) -> Self {
        DelaySpec::Fixed(Duration::from_millis(ms))
    }
}

impl fmt::Debug for DelaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelaySpec::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            DelaySpec::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// How a buffering stage releases once its fire condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Release {
    /// Release synchronously inside `accept`.
    #[default]
    Immediate,
    /// Release from a zero-delay timer task.
    Defer,
    /// Release from the runtime's flush scheduler.
    Batch,
}

impl Release {
    pub fn is_deferred(self) -> bool {
        !matches!(self, Release::Immediate)
    }
}

/// Configuration shared by hold and group stages.
#[derive(Clone, Default)]
pub struct HoldConfig {
    pub keep: Keep,
    pub ready: Option<ReadyFn>,
    pub clear: Option<ClearFn>,
    pub release: Release,
}

impl HoldConfig {
    /// Readiness of `buffer`. Without an explicit predicate a stage is only
    /// ready once a deferred release is attached, so a bare hold accumulates.
    pub fn is_ready(&self, buffer: &Buffer, last: Option<&Envelope>) -> bool {
        match &self.ready {
            Some(ready) => ready(buffer, last),
            None => self.release.is_deferred(),
        }
    }

    /// Latch state after a release; no predicate means always clear.
    pub fn stays_latched(&self, buffer: &Buffer) -> bool {
        self.clear.as_ref().is_some_and(|clear| clear(buffer))
    }
}

impl fmt::Debug for HoldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HoldConfig")
            .field("keep", &self.keep)
            .field("ready", &self.ready.is_some())
            .field("clear", &self.clear.is_some())
            .field("release", &self.release)
            .finish()
    }
}

/// The processing mode of a stage.
#[derive(Clone, Default)]
pub enum Operator {
    /// Forward unchanged.
    #[default]
    Pass,
    Filter(FilterFn),
    Transform(TransformFn),
    Rename(RenameFn),
    Run(RunFn),
    /// Synchronous keep: merge and forward the current view every message.
    Keep(Keep),
    Delay(DelaySpec),
    Hold(HoldConfig),
    /// Keyed hold. `None` keys by provenance.
    Group {
        key: Option<KeyFn>,
        hold: HoldConfig,
    },
}

impl Operator {
    pub fn kind(&self) -> &'static str {
        match self {
            Operator::Pass => "pass",
            Operator::Filter(_) => "filter",
            Operator::Transform(_) => "transform",
            Operator::Rename(_) => "rename",
            Operator::Run(_) => "run",
            Operator::Keep(_) => "keep",
            Operator::Delay(_) => "delay",
            Operator::Hold(_) => "hold",
            Operator::Group { .. } => "group",
        }
    }

    /// Hold configuration of a buffering operator.
    pub fn hold_config(&self) -> Option<&HoldConfig> {
        match self {
            Operator::Hold(hold) | Operator::Group { hold, .. } => Some(hold),
            _ => None,
        }
    }

    pub fn hold_config_mut(&mut self) -> Option<&mut HoldConfig> {
        match self {
            Operator::Hold(hold) | Operator::Group { hold, .. } => Some(hold),
            _ => None,
        }
    }

    pub fn filter<F>(f: F) -> Self
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<bool> + 'static,
    {
        Operator::Filter(Rc::new(f))
    }

    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<Value> + 'static,
    {
        Operator::Transform(Rc::new(f))
    }

    pub fn rename<F>(f: F) -> Self
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<String> + 'static,
    {
        Operator::Rename(Rc::new(f))
    }

    pub fn run<F>(f: F) -> Self
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<()> + 'static,
    {
        Operator::Run(Rc::new(f))
    }

    /// Group stage keyed by `key`, or by provenance when `None`.
    pub fn group(key: Option<KeyFn>) -> Self {
        Operator::Group {
            key,
            hold: HoldConfig::default(),
        }
    }

    /// Group stage keyed by a function of each message.
    pub fn group_by<F>(key: F) -> Self
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<String> + 'static,
    {
        Operator::group(Some(Rc::new(key)))
    }

    /// Operator that forwards only values differing from the previous forward.
    /// Provenance is ignored.
    pub fn skip_dupes() -> Self {
        Operator::filter(|value, _source, last| {
            Ok(last.map_or(true, |last| &last.value != value))
        })
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Keep(keep) => f.debug_tuple("Keep").field(keep).finish(),
            Operator::Delay(delay) => f.debug_tuple("Delay").field(delay).finish(),
            Operator::Hold(hold) => f.debug_tuple("Hold").field(hold).finish(),
            Operator::Group { key, hold } => f
                .debug_struct("Group")
                .field("keyed_by_fn", &key.is_some())
                .field("hold", hold)
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_spec() {
        assert_eq!(DelaySpec::from(25u64).duration(), Duration::from_millis(25));
        let computed = DelaySpec::Computed(Rc::new(|| Duration::from_secs(1)));
        assert_eq!(computed.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_bare_hold_is_never_ready() {
        let hold = HoldConfig::default();
        assert!(!hold.is_ready(&Buffer::default(), None));
    }

    #[test]
    fn test_deferred_hold_is_ready_by_default() {
        let hold = HoldConfig {
            release: Release::Batch,
            ..HoldConfig::default()
        };
        assert!(hold.is_ready(&Buffer::default(), None));
    }

    #[test]
    fn test_default_clear_resets() {
        assert!(!HoldConfig::default().stays_latched(&Buffer::default()));
    }

    #[test]
    fn test_skip_dupes_compares_value_only() {
        let Operator::Filter(f) = Operator::skip_dupes() else {
            panic!("skip_dupes must be a filter");
        };
        let last = Envelope::new(Value::Int(1), Some("a".into()));
        assert!(!f(&Value::Int(1), Some("b"), Some(&last)).unwrap());
        assert!(f(&Value::Int(2), Some("a"), Some(&last)).unwrap());
        assert!(f(&Value::Int(1), None, None).unwrap());
    }
}
