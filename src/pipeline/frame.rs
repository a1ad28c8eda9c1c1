//! Frame: a group of sibling stages sharing one operator configuration.
//!
//! Each stage in a frame is one channel. Configuration is broadcast to every
//! channel, but buffers, latches and last envelopes stay per channel.

use crate::pipeline::grammar::GroupState;
use crate::pipeline::operator::HoldConfig;
use crate::pipeline::stage::Stage;
use std::rc::Rc;

#[derive(Debug)]
pub struct Frame {
    index: usize,
    stages: Vec<Rc<Stage>>,
    state: GroupState,
}

impl Frame {
    pub fn new(index: usize, stages: Vec<Rc<Stage>>) -> Self {
        Self {
            index,
            stages,
            state: GroupState::Open,
        }
    }

    /// Position of this frame in its bus.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn stages(&self) -> &[Rc<Stage>] {
        &self.stages
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn is_holding(&self) -> bool {
        self.state == GroupState::Holding
    }

    pub(crate) fn set_state(&mut self, state: GroupState) {
        self.state = state;
    }

    /// Apply the same hold adjustment to every channel.
    pub fn configure_hold(&self, configure: impl Fn(&mut HoldConfig)) {
        for stage in &self.stages {
            stage.configure_hold(&configure);
        }
    }

    /// Destroy every channel.
    pub fn destroy(&self) {
        for stage in &self.stages {
            stage.destroy();
        }
    }
}
