//! Type-safe device identifier.
//!
//! [`DeviceId`] is a newtype wrapper around the opaque string a device
//! presents at connect time. Construction rejects the empty string, so a
//! `DeviceId` value is always a usable registry key.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Unique identifier for a connected light controller.
///
/// Supplied by the device via the `deviceId` query parameter. Used as the
/// key in [`crate::session::SessionRegistry`] and to build the device's
/// store paths.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Validates and wraps a raw identifier.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] if the identifier is empty
    /// or whitespace-only.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "device id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_plain_id() {
        let Ok(id) = DeviceId::parse("D1") else {
            panic!("valid id rejected");
        };
        assert_eq!(id.as_str(), "D1");
        assert_eq!(format!("{id}"), "D1");
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(matches!(
            DeviceId::parse(""),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(DeviceId::parse("   ").is_err());
    }

    #[test]
    fn parse_trims_whitespace() {
        let Ok(id) = "  lamp-7 ".parse::<DeviceId>() else {
            panic!("valid id rejected");
        };
        assert_eq!(id.as_str(), "lamp-7");
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<DeviceId, _> = serde_json::from_str("\"D1\"");
        assert!(ok.is_ok());
        let empty: Result<DeviceId, _> = serde_json::from_str("\"\"");
        assert!(empty.is_err());
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let Ok(id) = DeviceId::parse("D1") else {
            panic!("valid id rejected");
        };
        let mut map = HashMap::new();
        map.insert(id.clone(), "test");
        assert_eq!(map.get(&id), Some(&"test"));
    }
}
