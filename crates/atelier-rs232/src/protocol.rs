//! Status-frame framing and decoding.
//!
//! The appliance reports changed fields as CR LF terminated ASCII lines of
//! the form `;<code>;<payload>`, e.g. `;1;55` (volume 55) or `;6; Y` (mute
//! on). It never answers a command directly; a frame arriving after a write
//! is the only acknowledgement the driver gets.
//!
//! Framing ([`decode_line`]) and field decoding ([`decode_status`]) are
//! pure functions over byte and string slices so they can be tested without
//! a transport.

use atelier_core::{InputSource, MAX_VOLUME};
use tracing::trace;

use crate::state::StateUpdate;

/// Line terminator of every status frame.
pub const LINE_DELIMITER: &[u8] = b"\r\n";

/// Maximum receive buffer size before reset. Status frames are under 16
/// bytes; anything this long without a delimiter is line noise.
pub const MAX_BUF: usize = 1024;

/// Status frame field codes.
pub mod field_code {
    pub const POWER: u32 = 0;
    pub const VOLUME: u32 = 1;
    pub const LOUDNESS: u32 = 5;
    pub const MUTE: u32 = 6;
    pub const INPUT: u32 = 7;
    pub const SPEAKER_1: u32 = 8;
    pub const SPEAKER_2: u32 = 9;
}

/// Result of attempting to frame one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineResult {
    /// A complete line was framed.
    Line {
        /// Line text without the delimiter. `None` if it was not UTF-8.
        text: Option<String>,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// The buffer does not yet contain a delimiter.
    Incomplete,
}

/// Frame one delimited line from the front of `buf`.
pub fn decode_line(buf: &[u8]) -> LineResult {
    let pos = match buf
        .windows(LINE_DELIMITER.len())
        .position(|w| w == LINE_DELIMITER)
    {
        Some(pos) => pos,
        None => return LineResult::Incomplete,
    };

    let text = std::str::from_utf8(&buf[..pos]).ok().map(str::to_owned);
    LineResult::Line {
        text,
        consumed: pos + LINE_DELIMITER.len(),
    }
}

/// The two captures of a well-formed status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFrame<'a> {
    /// Decimal field code.
    pub code: &'a str,
    /// Payload after leading whitespace, cut at the first character outside
    /// `[A-Za-z0-9-. ]`.
    pub payload: &'a str,
}

fn is_payload_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ' ')
}

/// Split a line into code and payload, or `None` if it is not shaped like
/// `;<digits>;<payload>`.
pub fn parse_frame(line: &str) -> Option<StatusFrame<'_>> {
    let rest = line.strip_prefix(';')?;
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits == 0 {
        return None;
    }
    let (code, rest) = rest.split_at(digits);
    let rest = rest.strip_prefix(';')?.trim_start();
    let end = rest.find(|c: char| !is_payload_char(c)).unwrap_or(rest.len());

    Some(StatusFrame {
        code,
        payload: &rest[..end],
    })
}

fn flag(payload: &str) -> bool {
    payload.trim_start().starts_with('Y')
}

/// Decode a status line into the state update it reports.
///
/// Lines that are not frames, carry an unknown field code, or carry a
/// payload that does not parse for their field return `None`.
pub fn decode_status(line: &str) -> Option<StateUpdate> {
    let frame = parse_frame(line)?;
    let code: u32 = frame.code.parse().ok()?;
    let payload = frame.payload.trim();

    let update = match code {
        field_code::POWER => StateUpdate::Power(true),
        field_code::VOLUME => {
            let volume: u8 = payload.parse().ok()?;
            if volume > MAX_VOLUME {
                trace!(volume, "volume out of range");
                return None;
            }
            StateUpdate::Volume(volume)
        }
        field_code::LOUDNESS => StateUpdate::Loudness(flag(payload)),
        field_code::MUTE => StateUpdate::Mute(flag(payload)),
        field_code::INPUT => StateUpdate::Input(InputSource::from_wire_code(payload)?),
        field_code::SPEAKER_1 => StateUpdate::Speaker1(flag(payload)),
        field_code::SPEAKER_2 => StateUpdate::Speaker2(flag(payload)),
        _ => return None,
    };
    Some(update)
}
