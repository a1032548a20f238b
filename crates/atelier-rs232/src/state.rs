//! The believed device state and its single writer.
//!
//! [`StateTracker`] is owned by the IO task. Every write goes through
//! [`StateTracker::apply`], which stamps `last_updated` and publishes exactly
//! one [`StateEvent`] for the written field, whether or not the value
//! changed. Writes decoded from the wire go through [`StateTracker::heard`],
//! which also stamps `last_heard`.

use atelier_core::{DeviceState, InputSource, StateEvent, MAX_VOLUME};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::commands::Effect;

/// An absolute write of one state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    Power(bool),
    Volume(u8),
    Mute(bool),
    Loudness(bool),
    Input(InputSource),
    Speaker1(bool),
    Speaker2(bool),
}

impl StateUpdate {
    fn event(self) -> StateEvent {
        match self {
            StateUpdate::Power(on) => StateEvent::PowerChanged { on },
            StateUpdate::Volume(volume) => StateEvent::VolumeChanged { volume },
            StateUpdate::Mute(on) => StateEvent::MuteChanged { on },
            StateUpdate::Loudness(on) => StateEvent::LoudnessChanged { on },
            StateUpdate::Input(input) => StateEvent::InputChanged { input },
            StateUpdate::Speaker1(on) => StateEvent::Speaker1Changed { on },
            StateUpdate::Speaker2(on) => StateEvent::Speaker2Changed { on },
        }
    }

    /// Whether `state` already holds the value this update would write.
    pub fn is_current(self, state: &DeviceState) -> bool {
        match self {
            StateUpdate::Power(on) => state.is_on == on,
            StateUpdate::Volume(volume) => state.volume == volume,
            StateUpdate::Mute(on) => state.is_mute == on,
            StateUpdate::Loudness(on) => state.is_loudness == on,
            StateUpdate::Input(input) => state.input_source == input,
            StateUpdate::Speaker1(on) => state.is_speaker1 == on,
            StateUpdate::Speaker2(on) => state.is_speaker2 == on,
        }
    }
}

/// Owns the live [`DeviceState`] and publishes its changes.
pub struct StateTracker {
    state: DeviceState,
    last_heard: Option<Instant>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateTracker {
    pub fn new(event_tx: broadcast::Sender<StateEvent>) -> Self {
        StateTracker {
            state: DeviceState::default(),
            last_heard: None,
            event_tx,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn last_updated(&self) -> Option<Instant> {
        self.state.last_updated
    }

    /// When the appliance last sent a status frame.
    pub fn last_heard(&self) -> Option<Instant> {
        self.last_heard
    }

    /// Apply an update decoded from a status frame.
    pub fn heard(&mut self, update: StateUpdate, now: Instant) {
        self.last_heard = Some(now);
        self.apply(update, now);
    }

    /// Write one field, stamp the state, and publish the event.
    pub fn apply(&mut self, update: StateUpdate, now: Instant) {
        let s = &mut self.state;
        match update {
            StateUpdate::Power(on) => s.is_on = on,
            StateUpdate::Volume(volume) => s.volume = volume.min(MAX_VOLUME),
            StateUpdate::Mute(on) => s.is_mute = on,
            StateUpdate::Loudness(on) => s.is_loudness = on,
            StateUpdate::Input(input) => s.input_source = input,
            StateUpdate::Speaker1(on) => s.is_speaker1 = on,
            StateUpdate::Speaker2(on) => s.is_speaker2 = on,
        }
        s.last_updated = Some(now);
        debug!(?update, "state updated");
        // No subscribers is not an error.
        let _ = self.event_tx.send(update.event());
    }

    /// Apply a catalog effect relative to the current state.
    pub fn apply_effect(&mut self, effect: Effect, now: Instant) {
        let update = match effect {
            Effect::TogglePower => StateUpdate::Power(!self.state.is_on),
            Effect::StepVolume(delta) => StateUpdate::Volume(step_volume(self.state.volume, delta)),
            Effect::ToggleMute => StateUpdate::Mute(!self.state.is_mute),
            Effect::ToggleLoudness => StateUpdate::Loudness(!self.state.is_loudness),
            Effect::SelectInput(input) => StateUpdate::Input(input),
            Effect::ToggleSpeaker1 => StateUpdate::Speaker1(!self.state.is_speaker1),
            Effect::ToggleSpeaker2 => StateUpdate::Speaker2(!self.state.is_speaker2),
        };
        self.apply(update, now);
    }
}

/// Move `volume` by `delta`, clamped to `0..=MAX_VOLUME`.
pub fn step_volume(volume: u8, delta: i8) -> u8 {
    let stepped = i16::from(volume) + i16::from(delta);
    stepped.clamp(0, i16::from(MAX_VOLUME)) as u8
}
