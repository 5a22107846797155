//! Tri-state switches (`enabled` / `disabled` / not configured).

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// A setting that can be explicitly enabled, explicitly disabled, or left to
/// the proxy's default.
///
/// Serialises as `"enabled"` / `"disabled"`; fields holding a `Toggle` should
/// skip serialisation when [`Toggle::is_unset`] so the default is left alone.
/// Deserialises from those strings, from booleans, or from `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Toggle {
    /// Not configured.
    #[default]
    Unset,
    /// Explicitly enabled.
    Enabled,
    /// Explicitly disabled.
    Disabled,
}

impl Toggle {
    /// Returns true if the setting is not configured.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Converts an optional boolean.
    #[must_use]
    pub const fn from_bool(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Enabled,
            Some(false) => Self::Disabled,
            None => Self::Unset,
        }
    }

    /// Returns the explicit value, if any.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Enabled => Some(true),
            Self::Disabled => Some(false),
            Self::Unset => None,
        }
    }

    /// Returns the wire form, if any.
    #[must_use]
    pub const fn as_str(self) -> Option<&'static str> {
        match self {
            Self::Enabled => Some("enabled"),
            Self::Disabled => Some("disabled"),
            Self::Unset => None,
        }
    }
}

impl Serialize for Toggle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_str() {
            Some(value) => serializer.serialize_str(value),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(Self::Unset),
            Some(Raw::Flag(flag)) => Ok(Self::from_bool(Some(flag))),
            Some(Raw::Text(text)) => match text.to_ascii_lowercase().as_str() {
                "enabled" | "true" | "on" => Ok(Self::Enabled),
                "disabled" | "false" | "off" => Ok(Self::Disabled),
                "" => Ok(Self::Unset),
                other => Err(de::Error::custom(format!(
                    "expected 'enabled' or 'disabled', found '{other}'"
                ))),
            },
        }
    }
}

impl std::fmt::Display for Toggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().unwrap_or("unset"))
    }
}
