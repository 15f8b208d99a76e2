//! Pre-migration local state.

use crate::fund::Holding;
use crate::numeric::null_as_default;
use crate::settings::ViewMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A fund entry from the local `funds` list. Quote fields the UI caches
/// alongside (net values, estimates) are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalFund {
    pub code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// A group from the local `groups` list. Older builds kept membership on the
/// group itself as a list of fund codes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGroup {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub codes: Vec<String>,
}

/// Everything the UI kept locally before the remote store took over.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshot {
    pub funds: Vec<LocalFund>,
    pub favorites: BTreeSet<String>,
    pub collapsed_codes: BTreeSet<String>,
    pub holdings: BTreeMap<String, Holding>,
    pub groups: Vec<LocalGroup>,
    pub refresh_ms: Option<u64>,
    pub view_mode: Option<ViewMode>,
}

impl LocalSnapshot {
    /// Id of the first local group listing `code`, if any.
    pub fn group_of(&self, code: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.codes.iter().any(|c| c == code))
            .map(|g| g.id.as_str())
    }
}
