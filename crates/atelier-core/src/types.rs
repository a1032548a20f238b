//! Core types used throughout the Atelier driver.
//!
//! These describe what the driver believes about the appliance. None of
//! them perform I/O.

use std::fmt;
use std::str::FromStr;

use tokio::time::Instant;

/// Highest volume the appliance accepts, in device-native units.
pub const MAX_VOLUME: u8 = 100;

/// Volume the driver assumes before the appliance has reported anything.
pub const DEFAULT_VOLUME: u8 = 40;

/// Audio input source selectable on the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    /// AM tuner.
    AM,
    /// FM tuner.
    FM,
    /// Compact disc player.
    CD,
    /// Turntable (phono stage).
    Phono,
    /// Television / auxiliary input.
    TV,
    /// First tape deck.
    Tape1,
    /// Second tape deck.
    Tape2,
}

impl InputSource {
    /// All input sources, in front-panel order.
    pub const ALL: [InputSource; 7] = [
        InputSource::TV,
        InputSource::AM,
        InputSource::FM,
        InputSource::Tape1,
        InputSource::Tape2,
        InputSource::CD,
        InputSource::Phono,
    ];

    /// The literal code the appliance uses for this input in status frames.
    pub fn wire_code(&self) -> &'static str {
        match self {
            InputSource::AM => "AM",
            InputSource::FM => "FM",
            InputSource::CD => "CD",
            InputSource::Phono => "PH",
            InputSource::TV => "TV",
            InputSource::Tape1 => "T1",
            InputSource::Tape2 => "T2",
        }
    }

    /// Look up an input by its status-frame code. Case-sensitive.
    pub fn from_wire_code(code: &str) -> Option<Self> {
        match code {
            "AM" => Some(InputSource::AM),
            "FM" => Some(InputSource::FM),
            "CD" => Some(InputSource::CD),
            "PH" => Some(InputSource::Phono),
            "TV" => Some(InputSource::TV),
            "T1" => Some(InputSource::Tape1),
            "T2" => Some(InputSource::Tape2),
            _ => None,
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputSource::AM => "AM",
            InputSource::FM => "FM",
            InputSource::CD => "CD",
            InputSource::Phono => "Phono",
            InputSource::TV => "TV",
            InputSource::Tape1 => "Tape 1",
            InputSource::Tape2 => "Tape 2",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into an [`InputSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseInputError(String);

impl fmt::Display for ParseInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown input source: {}", self.0)
    }
}

impl std::error::Error for ParseInputError {}

impl FromStr for InputSource {
    type Err = ParseInputError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let norm = s.to_uppercase().replace([' ', '-', '_'], "");
        match norm.as_str() {
            "AM" => Ok(InputSource::AM),
            "FM" => Ok(InputSource::FM),
            "CD" => Ok(InputSource::CD),
            "PH" | "PHONO" => Ok(InputSource::Phono),
            "TV" => Ok(InputSource::TV),
            "T1" | "TAPE1" => Ok(InputSource::Tape1),
            "T2" | "TAPE2" => Ok(InputSource::Tape2),
            _ => Err(ParseInputError(s.to_string())),
        }
    }
}

/// Snapshot of the appliance's believed state.
///
/// Returned by the device handle; the live copy is owned by the IO task.
/// `last_updated` is `None` until the first mutation, which makes a fresh
/// connection count as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    /// Whether the appliance is powered on.
    pub is_on: bool,
    /// Volume in device-native units, `0..=100`.
    pub volume: u8,
    /// Whether the output is muted.
    pub is_mute: bool,
    /// Whether loudness compensation is enabled.
    pub is_loudness: bool,
    /// Currently selected input.
    pub input_source: InputSource,
    /// Whether speaker pair 1 is switched on.
    pub is_speaker1: bool,
    /// Whether speaker pair 2 is switched on.
    pub is_speaker2: bool,
    /// When any field was last written, locally or by a status frame.
    pub last_updated: Option<Instant>,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            is_on: false,
            volume: DEFAULT_VOLUME,
            is_mute: false,
            is_loudness: false,
            input_source: InputSource::TV,
            is_speaker1: false,
            is_speaker2: false,
            last_updated: None,
        }
    }
}

/// Static identification of a configured appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// User-facing name (e.g. "Living Room").
    pub name: String,
    /// Model string (e.g. "Atelier R4").
    pub model: String,
    /// Serial port path, if the device was opened by path.
    pub port: Option<String>,
}
