//! Fund shapes: the UI view, the `funds` table row, and patches.

use crate::numeric::{lenient_f64, lenient_f64_opt, lenient_i64, null_as_default};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A position in a fund: share count and cost basis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub share: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost: f64,
}

impl Holding {
    pub fn new(share: f64, cost: f64) -> Self {
        Self { share, cost }
    }
}

/// A tracked fund as the UI sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fund {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default)]
    pub holding: Option<Holding>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A row of the remote `funds` table.
///
/// Nullable columns decode leniently: `null` booleans are `false`, numeric
/// holding columns accept numbers or numeric strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FundRow {
    pub user_id: String,
    pub fund_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fund_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_favorite: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_collapsed: bool,
    #[serde(default, deserialize_with = "lenient_f64_opt")]
    pub holding_shares: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64_opt")]
    pub holding_cost: Option<f64>,
    /// Legacy single-amount holding, kept readable for old rows.
    #[serde(default, deserialize_with = "lenient_f64_opt")]
    pub holding_amount: Option<f64>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub sort_order: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for adding a fund.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFund {
    pub code: String,
    pub name: String,
}

impl NewFund {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Sparse update for a fund. `None` means "leave unchanged".
///
/// `holding` and `group_id` are nullable columns: `Some(None)` clears them,
/// and serialises as an explicit `null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_collapsed: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub holding: Option<Option<Holding>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}

impl FundPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn set_holding(holding: Holding) -> Self {
        Self {
            holding: Some(Some(holding)),
            ..Default::default()
        }
    }

    pub fn clear_holding() -> Self {
        Self {
            holding: Some(None),
            ..Default::default()
        }
    }

    pub fn set_group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(Some(group_id.into())),
            ..Default::default()
        }
    }

    pub fn clear_group() -> Self {
        Self {
            group_id: Some(None),
            ..Default::default()
        }
    }
}

/// A field that is present decodes to `Some`, even when it is `null`.
/// Absent fields fall back to `None` through `#[serde(default)]`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Everything the UI needs on startup, rebuilt from the fund rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullFundsData {
    pub funds: Vec<Fund>,
    pub favorites: BTreeSet<String>,
    pub collapsed_codes: BTreeSet<String>,
    pub holdings: BTreeMap<String, Holding>,
}
