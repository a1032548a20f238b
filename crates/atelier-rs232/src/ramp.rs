//! Volume ramp controller.
//!
//! The appliance has no absolute volume command. Reaching a target means
//! stepping one unit at a time and keeping a private count of where the
//! device probably is, because the status echo of each step arrives late
//! or not at all. The ramp is retargetable while it runs; the direction is
//! recomputed before every step.

use atelier_core::MAX_VOLUME;
use tracing::{debug, warn};

use crate::commands::Command;

/// Default number of steps after which a ramp is abandoned.
pub const DEFAULT_MAX_RAMP_STEPS: u32 = 250;

/// Outcome of a ramp iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampTick {
    /// Write this step command next.
    Step(Command),
    /// The believed volume reached the target.
    Finished,
    /// The step budget ran out before the target was reached.
    Abandoned,
    /// No ramp is active.
    Idle,
}

#[derive(Debug)]
pub struct VolumeRamp {
    target: Option<u8>,
    current: u8,
    steps: u32,
    max_steps: u32,
}

impl VolumeRamp {
    pub fn new(max_steps: u32) -> Self {
        VolumeRamp {
            target: None,
            current: 0,
            steps: 0,
            max_steps,
        }
    }

    pub fn target(&self) -> Option<u8> {
        self.target
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Aim the ramp at `target`, starting from the believed volume `from`
    /// if no ramp is active.
    ///
    /// Returns `true` when a new ramp was started and the caller must queue
    /// its priming step and first iteration. An active ramp is only
    /// retargeted.
    pub fn ramp_to(&mut self, target: u8, from: u8) -> bool {
        debug_assert!(target <= MAX_VOLUME, "ramp target {target} out of range");
        let target = target.min(MAX_VOLUME);

        if self.target.is_some() {
            debug!(target, current = self.current, "ramp retargeted");
            self.target = Some(target);
            return false;
        }

        debug!(target, from, "ramp started");
        self.target = Some(target);
        self.current = from;
        self.steps = 0;
        true
    }

    /// Decide the next step.
    pub fn tick(&mut self) -> RampTick {
        let Some(target) = self.target else {
            return RampTick::Idle;
        };

        if self.current == target {
            debug!(target, "ramp finished");
            self.target = None;
            return RampTick::Finished;
        }

        if self.steps >= self.max_steps {
            warn!(
                target,
                current = self.current,
                steps = self.steps,
                "volume ramp abandoned"
            );
            self.target = None;
            return RampTick::Abandoned;
        }

        self.steps += 1;
        if self.current < target {
            RampTick::Step(Command::VolumeUp)
        } else {
            RampTick::Step(Command::VolumeDown)
        }
    }

    /// Account for an acknowledged step write.
    pub fn advance(&mut self, command: Command) {
        match command {
            Command::VolumeUp => self.current = self.current.saturating_add(1).min(MAX_VOLUME),
            Command::VolumeDown => self.current = self.current.saturating_sub(1),
            _ => {}
        }
    }
}
