//! Color model: RGB and HSV triples and the RGB → HSV conversion.
//!
//! Devices only understand HSV on the wire. Store values may hold either
//! representation, so everything is normalized through [`ColorValue::to_hsv`]
//! before a frame is built.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Largest hue the wire format carries, in degrees.
pub const MAX_HUE: u16 = 360;

/// An 8-bit-per-channel RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates a new RGB triple.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// An HSV color scaled for the wire: hue in degrees, saturation and value
/// in `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Hsv {
    /// Hue in degrees, `0..=360`.
    pub h: u16,
    /// Saturation, `0..=255`.
    pub s: u8,
    /// Value (brightness), `0..=255`.
    pub v: u8,
}

impl Hsv {
    /// Creates an HSV triple, checking the hue range.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] if `h` exceeds [`MAX_HUE`].
    pub fn new(h: u16, s: u8, v: u8) -> Result<Self, BridgeError> {
        if h > MAX_HUE {
            return Err(BridgeError::InvalidArgument(format!(
                "hue {h} out of range 0..={MAX_HUE}"
            )));
        }
        Ok(Self { h, s, v })
    }
}

/// A color as found in the state store, in whichever representation the
/// store used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColorValue {
    /// `{r, g, b}` triple.
    Rgb(Rgb),
    /// `{h, s, v}` triple.
    Hsv(Hsv),
}

impl ColorValue {
    /// Normalizes the color to the wire HSV encoding.
    #[must_use]
    pub fn to_hsv(self) -> Hsv {
        match self {
            Self::Rgb(rgb) => rgb_to_hsv(rgb),
            Self::Hsv(hsv) => hsv,
        }
    }
}

impl From<Rgb> for ColorValue {
    fn from(rgb: Rgb) -> Self {
        Self::Rgb(rgb)
    }
}

impl From<Hsv> for ColorValue {
    fn from(hsv: Hsv) -> Self {
        Self::Hsv(hsv)
    }
}

/// Converts an RGB color to wire HSV.
///
/// Standard min/max/delta derivation. Hue is rounded to the nearest degree
/// and is `0` for achromatic colors; saturation is `delta / max` rounded to
/// the nearest step of `1/255`; value is the largest channel.
///
/// Channel differences are taken on the integer inputs so that the ratios
/// feeding the rounding steps are exact.
#[must_use]
pub fn rgb_to_hsv(rgb: Rgb) -> Hsv {
    let (r, g, b) = (i32::from(rgb.r), i32::from(rgb.g), i32::from(rgb.b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0 {
        0.0
    } else {
        let d = f64::from(delta);
        let sector = if max == r {
            (f64::from(g - b) / d).rem_euclid(6.0)
        } else if max == g {
            f64::from(b - r) / d + 2.0
        } else {
            f64::from(r - g) / d + 4.0
        };
        60.0 * sector
    };

    // round(delta * 255 / max) in integer arithmetic
    let saturation = if max == 0 {
        0
    } else {
        (delta * 255 + max / 2) / max
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let h = (hue.round() as u16).min(MAX_HUE);

    Hsv {
        h,
        s: u8::try_from(saturation).unwrap_or(u8::MAX),
        v: rgb.r.max(rgb.g).max(rgb.b),
    }
}
