use crate::numeric::{lenient_i64_opt, lenient_string_opt};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Refresh interval used when none is stored.
pub const DEFAULT_REFRESH_MS: u64 = 30_000;

/// How the fund list is laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    Card,
    List,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Card => "card",
            ViewMode::List => "list",
        }
    }

    /// Total parse: anything that is not `"list"` is a card view.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("list") {
            ViewMode::List
        } else {
            ViewMode::Card
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ViewMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ViewMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ViewMode::parse).unwrap_or_default())
    }
}

/// Per-user display settings as the UI sees them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub refresh_ms: u64,
    pub view_mode: ViewMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_ms: DEFAULT_REFRESH_MS,
            view_mode: ViewMode::Card,
        }
    }
}

/// A row of the remote `user_settings` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRow {
    pub user_id: String,
    /// Milliseconds. Numeric strings and fractions are accepted.
    #[serde(default, deserialize_with = "lenient_i64_opt")]
    pub refresh_interval: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string_opt")]
    pub view_mode: Option<String>,
}

/// Sparse settings update. `None` means "leave unchanged".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_mode: Option<ViewMode>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.refresh_ms.is_none() && self.view_mode.is_none()
    }
}
