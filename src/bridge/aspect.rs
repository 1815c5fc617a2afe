//! Watched state aspects and how their store values map to commands.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{ColorValue, DeviceCommand, DeviceId, Hsv, Rgb};
use crate::error::BridgeError;

/// Field holding an optional transition duration next to the color.
const DURATION_FIELD: &str = "durationMs";

/// One independently watched piece of device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateAspect {
    /// Committed target state: `{"color": {"r","g","b"}, ...}`.
    Desired,
    /// Live preview while the user drags a picker: `{"r","g","b"}`.
    Preview,
}

impl StateAspect {
    /// All aspects, in attach order.
    pub const ALL: [Self; 2] = [Self::Desired, Self::Preview];

    /// Short name used in logs and the admin API.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Desired => "desired",
            Self::Preview => "preview",
        }
    }

    /// Store key under the device node.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Desired => "desiredState",
            Self::Preview => "previewState",
        }
    }

    /// Full store path for `device_id`.
    #[must_use]
    pub fn path(self, device_id: &DeviceId) -> String {
        format!("devices/{device_id}/{}", self.key())
    }

    /// Translates a store value into a color command.
    ///
    /// Returns `None` for values that do not (yet) carry a complete,
    /// in-range color: the store may legitimately hold intermediate data.
    #[must_use]
    pub fn translate(self, value: &Value) -> Option<DeviceCommand> {
        let color_node = match self {
            Self::Desired => value.get("color")?,
            Self::Preview => value,
        };
        let color = parse_color(color_node)?;
        let duration_ms = match value.get(DURATION_FIELD) {
            None | Some(Value::Null) => 0,
            Some(raw) => u16::try_from(raw.as_i64()?).ok()?,
        };
        Some(DeviceCommand::SetColor { color, duration_ms })
    }
}

impl fmt::Display for StateAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateAspect {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desired" | "desiredState" => Ok(Self::Desired),
            "preview" | "previewState" => Ok(Self::Preview),
            other => Err(BridgeError::InvalidArgument(format!(
                "unknown state aspect {other:?}"
            ))),
        }
    }
}

/// Reads an `{r,g,b}` or `{h,s,v}` object. RGB wins when both are present.
fn parse_color(node: &Value) -> Option<ColorValue> {
    let field = |name: &str| node.get(name).and_then(Value::as_i64);

    if let (Some(r), Some(g), Some(b)) = (field("r"), field("g"), field("b")) {
        let rgb = Rgb::new(
            u8::try_from(r).ok()?,
            u8::try_from(g).ok()?,
            u8::try_from(b).ok()?,
        );
        return Some(rgb.into());
    }

    if let (Some(h), Some(s), Some(v)) = (field("h"), field("s"), field("v")) {
        let hsv = Hsv::new(
            u16::try_from(h).ok()?,
            u8::try_from(s).ok()?,
            u8::try_from(v).ok()?,
        )
        .ok()?;
        return Some(hsv.into());
    }

    None
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn red() -> DeviceCommand {
        DeviceCommand::SetColor {
            color: Rgb::new(255, 0, 0).into(),
            duration_ms: 0,
        }
    }

    #[test]
    fn paths_are_device_scoped() {
        let Ok(id) = DeviceId::parse("D1") else {
            panic!("valid id");
        };
        assert_eq!(StateAspect::Desired.path(&id), "devices/D1/desiredState");
        assert_eq!(StateAspect::Preview.path(&id), "devices/D1/previewState");
    }

    #[test]
    fn desired_reads_nested_color() {
        let value = json!({"color": {"r": 255, "g": 0, "b": 0}, "power": true});
        assert_eq!(StateAspect::Desired.translate(&value), Some(red()));
    }

    #[test]
    fn preview_reads_direct_triple() {
        let value = json!({"r": 255, "g": 0, "b": 0});
        assert_eq!(StateAspect::Preview.translate(&value), Some(red()));
        // the nested shape is not the preview shape
        assert_eq!(
            StateAspect::Preview.translate(&json!({"color": {"r": 255, "g": 0, "b": 0}})),
            None
        );
    }

    #[test]
    fn hsv_representation_is_accepted() {
        let value = json!({"color": {"h": 200, "s": 10, "v": 20}});
        let Some(DeviceCommand::SetColor { color, .. }) = StateAspect::Desired.translate(&value)
        else {
            panic!("hsv color ignored");
        };
        assert_eq!(color.to_hsv(), Hsv { h: 200, s: 10, v: 20 });
    }

    #[test]
    fn duration_is_picked_up() {
        let value = json!({"color": {"r": 1, "g": 2, "b": 3}, "durationMs": 750});
        let Some(DeviceCommand::SetColor { duration_ms, .. }) =
            StateAspect::Desired.translate(&value)
        else {
            panic!("color ignored");
        };
        assert_eq!(duration_ms, 750);
    }

    #[test]
    fn incomplete_or_out_of_range_values_are_ignored() {
        let rejected = [
            Value::Null,
            json!({}),
            json!({"color": {"r": 1, "g": 2}}),
            json!({"color": {"r": 256, "g": 0, "b": 0}}),
            json!({"color": {"r": "1", "g": 0, "b": 0}}),
            json!({"color": {"h": 361, "s": 0, "v": 0}}),
            json!({"color": {"r": 1, "g": 2, "b": 3}, "durationMs": 70000}),
        ];
        for value in &rejected {
            assert_eq!(StateAspect::Desired.translate(value), None, "{value}");
        }
    }

    #[test]
    fn aspect_parses_from_name_or_key() {
        assert_eq!(
            "desired".parse::<StateAspect>().ok(),
            Some(StateAspect::Desired)
        );
        assert_eq!(
            "previewState".parse::<StateAspect>().ok(),
            Some(StateAspect::Preview)
        );
        assert!("other".parse::<StateAspect>().is_err());
    }
}
