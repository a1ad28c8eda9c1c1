//! Test data builders for runtimes and recording sinks

use flowbus::{Bus, BusConfig, ManualTimers, Operator, Runtime, Stage, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Builder for runtimes on a virtual clock
pub struct RuntimeBuilder {
    config: BusConfig,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
        }
    }

    pub fn max_generations(mut self, limit: usize) -> Self {
        self.config.scheduler.max_generations = limit;
        self
    }

    /// Leave flushing to the test
    pub fn manual_flush(mut self) -> Self {
        self.config.scheduler.auto_flush = false;
        self
    }

    pub fn build(self) -> (Runtime, Rc<ManualTimers>) {
        Runtime::manual(self.config)
    }
}

/// Records every message that reaches it
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Rc<RefCell<Vec<(Value, Option<String>)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a recording `run` frame to `bus`
    pub fn attach(&self, bus: &mut Bus) {
        let seen = Rc::clone(&self.seen);
        bus.run(move |v, s, _| seen.borrow_mut().push((v.clone(), s.map(str::to_string))))
            .expect("recorder attaches to an open bus");
    }

    /// Recording stage for manual wiring, e.g. behind a hold that is still open
    pub fn stage(&self, runtime: &Runtime) -> Rc<Stage> {
        let seen = Rc::clone(&self.seen);
        Stage::with_operator(
            runtime,
            Operator::run(move |v, s, _| {
                seen.borrow_mut().push((v.clone(), s.map(str::to_string)));
                Ok(())
            }),
        )
    }

    pub fn values(&self) -> Vec<Value> {
        self.seen.borrow().iter().map(|(v, _)| v.clone()).collect()
    }

    pub fn sources(&self) -> Vec<Option<String>> {
        self.seen.borrow().iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_attaches() {
        let (rt, _) = RuntimeBuilder::new().manual_flush().build();
        let source = rt.stage();
        let mut bus = Bus::from_stage(Rc::clone(&source));
        let recorder = Recorder::new();
        recorder.attach(&mut bus);

        source.accept(Value::Int(1), Some("a".into())).unwrap();
        assert_eq!(recorder.values(), vec![Value::Int(1)]);
        assert_eq!(recorder.sources(), vec![Some("a".to_string())]);
        assert!(!rt.scheduler().settings().auto_flush);
    }
}
