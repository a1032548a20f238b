//! Device state change events.
//!
//! Events are published by the IO task through a [`tokio::sync::broadcast`]
//! channel at the moment a field of the believed state is written, in
//! mutation order. A status frame that repeats the current value still
//! produces an event: the appliance changing its front-panel indicator is
//! itself informative to subscribers.

use crate::types::InputSource;

/// Names one field of [`DeviceState`](crate::types::DeviceState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Power,
    Volume,
    Mute,
    Loudness,
    Input,
    Speaker1,
    Speaker2,
}

/// An event emitted when a field of the believed device state is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// Power state was written.
    PowerChanged {
        /// `true` if the appliance is believed to be on.
        on: bool,
    },

    /// Volume was written.
    VolumeChanged {
        /// New volume in device-native units.
        volume: u8,
    },

    /// Mute state was written.
    MuteChanged {
        /// `true` if muted.
        on: bool,
    },

    /// Loudness compensation was written.
    LoudnessChanged {
        /// `true` if loudness is enabled.
        on: bool,
    },

    /// Input selection was written.
    InputChanged {
        /// Newly selected input.
        input: InputSource,
    },

    /// Speaker pair 1 was written.
    Speaker1Changed { on: bool },

    /// Speaker pair 2 was written.
    Speaker2Changed { on: bool },
}

impl StateEvent {
    /// The field this event reports on.
    pub fn field(&self) -> Field {
        match self {
            StateEvent::PowerChanged { .. } => Field::Power,
            StateEvent::VolumeChanged { .. } => Field::Volume,
            StateEvent::MuteChanged { .. } => Field::Mute,
            StateEvent::LoudnessChanged { .. } => Field::Loudness,
            StateEvent::InputChanged { .. } => Field::Input,
            StateEvent::Speaker1Changed { .. } => Field::Speaker1,
            StateEvent::Speaker2Changed { .. } => Field::Speaker2,
        }
    }
}
