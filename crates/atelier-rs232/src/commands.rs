//! The appliance command catalog.
//!
//! Every operation the appliance understands is one variant of
//! [`Command`]. A command pairs a fixed three-byte control sequence with an
//! optional [`Effect`] on the believed state, applied optimistically once
//! the write has been acknowledged by the transport.
//!
//! Commands compare by variant. Two requests for the same operation are the
//! same value, which is what queue de-duplication and the write history
//! rely on.

use std::fmt;

use atelier_core::InputSource;

/// One entry of the appliance command catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Power,
    VolumeUp,
    VolumeDown,
    Mute,
    Loudness,
    InputAm,
    InputFm,
    InputCd,
    InputPhono,
    InputTv,
    InputTape1,
    InputTape2,
    Speaker1,
    Speaker2,
    Stop,
    Pause,
    Start,
    FastForward,
    Rewind,
    /// Ask the appliance to report its status fields.
    TransmitStatus,
}

/// State mutation attached to a catalog command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    TogglePower,
    /// Move the volume by one unit, clamped to the device range.
    StepVolume(i8),
    ToggleMute,
    ToggleLoudness,
    SelectInput(InputSource),
    ToggleSpeaker1,
    ToggleSpeaker2,
}

impl Command {
    /// The complete catalog.
    pub const ALL: [Command; 20] = [
        Command::Power,
        Command::VolumeUp,
        Command::VolumeDown,
        Command::Mute,
        Command::Loudness,
        Command::InputAm,
        Command::InputFm,
        Command::InputCd,
        Command::InputPhono,
        Command::InputTv,
        Command::InputTape1,
        Command::InputTape2,
        Command::Speaker1,
        Command::Speaker2,
        Command::Stop,
        Command::Pause,
        Command::Start,
        Command::FastForward,
        Command::Rewind,
        Command::TransmitStatus,
    ];

    /// The raw control sequence written to the port.
    pub fn wire_bytes(self) -> &'static [u8] {
        match self {
            Command::Power => b"0<2",
            Command::VolumeUp => b"0<3",
            Command::VolumeDown => b"0<4",
            Command::Mute => b"0<5",
            Command::Loudness => b"0;>",
            Command::InputAm => b"0<9",
            Command::InputFm => b"0<<",
            Command::InputCd => b"0<>",
            Command::InputPhono => b"0<=",
            Command::InputTv => b"0<;",
            Command::InputTape1 => b"09?",
            Command::InputTape2 => b"09@",
            Command::Speaker1 => b"0<?",
            Command::Speaker2 => b"0<@",
            Command::Stop => b"0:4",
            Command::Pause => b"0:5",
            Command::Start => b"0:6",
            Command::FastForward => b"0:2",
            Command::Rewind => b"0:3",
            Command::TransmitStatus => b"0:7",
        }
    }

    /// Human-readable name, used in logs and the CLI.
    pub fn name(self) -> &'static str {
        match self {
            Command::Power => "power",
            Command::VolumeUp => "volume-up",
            Command::VolumeDown => "volume-down",
            Command::Mute => "mute",
            Command::Loudness => "loudness",
            Command::InputAm => "input-am",
            Command::InputFm => "input-fm",
            Command::InputCd => "input-cd",
            Command::InputPhono => "input-phono",
            Command::InputTv => "input-tv",
            Command::InputTape1 => "input-tape1",
            Command::InputTape2 => "input-tape2",
            Command::Speaker1 => "speaker-1",
            Command::Speaker2 => "speaker-2",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Start => "start",
            Command::FastForward => "fast-forward",
            Command::Rewind => "rewind",
            Command::TransmitStatus => "transmit-status",
        }
    }

    /// Look up a command by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Command::ALL.into_iter().find(|c| c.name() == name)
    }

    /// The catalog effect of this command, if it has one.
    ///
    /// Transport controls and the status request change nothing the driver
    /// tracks.
    pub fn effect(self) -> Option<Effect> {
        match self {
            Command::Power => Some(Effect::TogglePower),
            Command::VolumeUp => Some(Effect::StepVolume(1)),
            Command::VolumeDown => Some(Effect::StepVolume(-1)),
            Command::Mute => Some(Effect::ToggleMute),
            Command::Loudness => Some(Effect::ToggleLoudness),
            Command::InputAm => Some(Effect::SelectInput(InputSource::AM)),
            Command::InputFm => Some(Effect::SelectInput(InputSource::FM)),
            Command::InputCd => Some(Effect::SelectInput(InputSource::CD)),
            Command::InputPhono => Some(Effect::SelectInput(InputSource::Phono)),
            Command::InputTv => Some(Effect::SelectInput(InputSource::TV)),
            Command::InputTape1 => Some(Effect::SelectInput(InputSource::Tape1)),
            Command::InputTape2 => Some(Effect::SelectInput(InputSource::Tape2)),
            Command::Speaker1 => Some(Effect::ToggleSpeaker1),
            Command::Speaker2 => Some(Effect::ToggleSpeaker2),
            Command::Stop
            | Command::Pause
            | Command::Start
            | Command::FastForward
            | Command::Rewind
            | Command::TransmitStatus => None,
        }
    }

    /// Whether this is one of the two volume step commands.
    pub fn is_volume(self) -> bool {
        matches!(self, Command::VolumeUp | Command::VolumeDown)
    }

    /// The input selection command for `input`.
    pub fn for_input(input: InputSource) -> Self {
        match input {
            InputSource::AM => Command::InputAm,
            InputSource::FM => Command::InputFm,
            InputSource::CD => Command::InputCd,
            InputSource::Phono => Command::InputPhono,
            InputSource::TV => Command::InputTv,
            InputSource::Tape1 => Command::InputTape1,
            InputSource::Tape2 => Command::InputTape2,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
