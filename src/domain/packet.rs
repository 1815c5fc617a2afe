//! Fixed-width binary command frames for light controllers.
//!
//! Every frame is exactly [`FRAME_LEN`] bytes:
//!
//! ```text
//! offset  size  field         encoding
//! 0       1     opcode        0x01 SET_COLOR, 0x02 OFFLINE, 0x03 HEARTBEAT
//! 1       2     hue           u16 big-endian, 0..=360
//! 3       1     saturation    u8
//! 4       1     value         u8
//! 5       1     auxiliary     u8, reserved (always 0 when encoding)
//! 6       2     duration-ms   u16 big-endian
//! ```
//!
//! The transport preserves message boundaries, so there is no delimiter or
//! length prefix: one WebSocket binary message carries one frame.

use std::fmt;
use std::fmt::Write as _;

use super::color::{Hsv, MAX_HUE, Rgb, rgb_to_hsv};
use crate::error::BridgeError;

/// Size of every frame in bytes.
pub const FRAME_LEN: usize = 8;

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Set the light to an HSV color over a duration.
    SetColor = 0x01,
    /// The upstream state is unavailable; the device should show offline.
    Offline = 0x02,
    /// Keep-alive with no payload.
    Heartbeat = 0x03,
}

impl Opcode {
    /// Returns the wire name of the opcode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SetColor => "SET_COLOR",
            Self::Offline => "OFFLINE",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = BridgeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Self::SetColor),
            0x02 => Ok(Self::Offline),
            0x03 => Ok(Self::Heartbeat),
            other => Err(BridgeError::MalformedFrame(format!(
                "unknown opcode 0x{other:02x}"
            ))),
        }
    }
}

/// One immutable command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet {
    opcode: Opcode,
    hue: u16,
    saturation: u8,
    value: u8,
    aux: u8,
    duration_ms: u16,
}

impl Packet {
    /// Builds a SET_COLOR frame from RGB channels.
    ///
    /// Inputs are taken wide so that callers holding unchecked values (for
    /// instance numbers read from JSON) get a range error instead of a
    /// silent truncation.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] if any channel is outside
    /// `0..=255` or `duration_ms` is outside `0..=65535`.
    pub fn set_color(r: i64, g: i64, b: i64, duration_ms: i64) -> Result<Self, BridgeError> {
        let rgb = Rgb::new(channel("r", r)?, channel("g", g)?, channel("b", b)?);
        let duration_ms = u16::try_from(duration_ms).map_err(|_| {
            BridgeError::InvalidArgument(format!(
                "duration {duration_ms} ms out of range 0..=65535"
            ))
        })?;
        Ok(Self::set_hsv(rgb_to_hsv(rgb), duration_ms))
    }

    /// Builds a SET_COLOR frame from an already-converted HSV color.
    #[must_use]
    pub const fn set_hsv(hsv: Hsv, duration_ms: u16) -> Self {
        Self {
            opcode: Opcode::SetColor,
            hue: hsv.h,
            saturation: hsv.s,
            value: hsv.v,
            aux: 0,
            duration_ms,
        }
    }

    /// Builds an OFFLINE frame.
    #[must_use]
    pub const fn offline() -> Self {
        Self::bare(Opcode::Offline)
    }

    /// Builds a HEARTBEAT frame.
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self::bare(Opcode::Heartbeat)
    }

    const fn bare(opcode: Opcode) -> Self {
        Self {
            opcode,
            hue: 0,
            saturation: 0,
            value: 0,
            aux: 0,
            duration_ms: 0,
        }
    }

    /// Parses and validates a received frame.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedFrame`] if the buffer is not exactly
    /// [`FRAME_LEN`] bytes, the opcode is unknown, or a SET_COLOR frame
    /// carries a hue above 360.
    pub fn decode(bytes: &[u8]) -> Result<Self, BridgeError> {
        let frame: [u8; FRAME_LEN] = bytes.try_into().map_err(|_| {
            BridgeError::MalformedFrame(format!("length {} != {FRAME_LEN}", bytes.len()))
        })?;
        let [op, hue_hi, hue_lo, saturation, value, aux, dur_hi, dur_lo] = frame;

        let opcode = Opcode::try_from(op)?;
        let hue = u16::from_be_bytes([hue_hi, hue_lo]);
        if opcode == Opcode::SetColor && hue > MAX_HUE {
            return Err(BridgeError::MalformedFrame(format!(
                "hue {hue} out of range 0..={MAX_HUE}"
            )));
        }

        Ok(Self {
            opcode,
            hue,
            saturation,
            value,
            aux,
            duration_ms: u16::from_be_bytes([dur_hi, dur_lo]),
        })
    }

    /// Serializes the frame to its wire bytes.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let [hue_hi, hue_lo] = self.hue.to_be_bytes();
        let [dur_hi, dur_lo] = self.duration_ms.to_be_bytes();
        [
            self.opcode as u8,
            hue_hi,
            hue_lo,
            self.saturation,
            self.value,
            self.aux,
            dur_hi,
            dur_lo,
        ]
    }

    /// Frame opcode.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Color carried by the frame (all zero for non-color opcodes).
    #[must_use]
    pub const fn hsv(&self) -> Hsv {
        Hsv {
            h: self.hue,
            s: self.saturation,
            v: self.value,
        }
    }

    /// Auxiliary byte.
    #[must_use]
    pub const fn aux(&self) -> u8 {
        self.aux
    }

    /// Transition duration in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u16 {
        self.duration_ms
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Opcode::SetColor => write!(
                f,
                "SET_COLOR h={} s={} v={} aux={} duration={}ms",
                self.hue, self.saturation, self.value, self.aux, self.duration_ms
            ),
            other => f.write_str(other.name()),
        }
    }
}

fn channel(name: &str, raw: i64) -> Result<u8, BridgeError> {
    u8::try_from(raw).map_err(|_| {
        BridgeError::InvalidArgument(format!("channel {name}={raw} out of range 0..=255"))
    })
}

/// Returns `true` if `bytes` is a well-formed frame.
#[must_use]
pub fn validate(bytes: &[u8]) -> bool {
    Packet::decode(bytes).is_ok()
}

/// Renders a frame for logs and diagnostics.
///
/// Malformed input is never rejected silently: it comes back as
/// `MALFORMED(<reason>; <hex bytes>)`.
#[must_use]
pub fn describe(bytes: &[u8]) -> String {
    match Packet::decode(bytes) {
        Ok(packet) => packet.to_string(),
        Err(err) => {
            let mut hex = String::with_capacity(bytes.len() * 3);
            for (i, byte) in bytes.iter().enumerate() {
                if i > 0 {
                    hex.push(' ');
                }
                let _ = write!(hex, "{byte:02x}");
            }
            let reason = match err {
                BridgeError::MalformedFrame(reason) => reason,
                other => other.to_string(),
            };
            format!("MALFORMED({reason}; {hex})")
        }
    }
}
