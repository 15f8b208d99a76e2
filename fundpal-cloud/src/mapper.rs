//! Translation between UI shapes and storage rows.
//!
//! Writes are sparse: only fields present in a patch reach the row, so an
//! absent field never clears a column. Clearing takes an explicit `null`. Reads are total: nothing here
//! rejects a well-keyed row.

use crate::error::CloudResult;
use crate::query::Row;
use fundpal_types::{
    DEFAULT_REFRESH_MS, FullFundsData, Fund, FundPatch, FundRow, Group, GroupRow, Holding,
    LocalFund, LocalSnapshot, NewFund, NewGroup, Settings, SettingsPatch, SettingsRow, UserId,
    ViewMode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decodes raw rows into a typed row shape.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> CloudResult<Vec<T>> {
    rows.into_iter().map(decode_row).collect()
}

pub fn decode_row<T: DeserializeOwned>(row: Row) -> CloudResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

fn base_row(user: &UserId) -> Row {
    let mut row = Row::new();
    row.insert("user_id".into(), Value::from(user.as_str()));
    row
}

// ── Funds ──

/// Holding view of a row.
///
/// Non-empty `holding_shares` wins; a row carrying only the legacy
/// `holding_amount` maps to a zero holding, since the amount cannot be
/// split back into shares and cost.
pub fn holding_from_row(row: &FundRow) -> Option<Holding> {
    match (row.holding_shares, row.holding_amount) {
        (Some(share), _) => Some(Holding::new(share, row.holding_cost.unwrap_or(0.0))),
        (None, Some(_)) => Some(Holding::default()),
        (None, None) => None,
    }
}

pub fn fund_from_row(row: FundRow) -> Fund {
    let holding = holding_from_row(&row);
    Fund {
        code: row.fund_code,
        name: row.fund_name,
        is_favorite: row.is_favorite,
        is_collapsed: row.is_collapsed,
        holding,
        group_id: row.group_id,
        sort_order: row.sort_order,
        created_at: row.created_at,
    }
}

pub fn new_fund_row(user: &UserId, fund: &NewFund) -> Row {
    let mut row = base_row(user);
    row.insert("fund_code".into(), Value::from(fund.code.as_str()));
    row.insert("fund_name".into(), Value::from(fund.name.as_str()));
    row
}

/// Columns touched by `patch`, and nothing else.
pub fn fund_patch_to_row(patch: &FundPatch) -> Row {
    let mut row = Row::new();
    if let Some(name) = &patch.name {
        row.insert("fund_name".into(), Value::from(name.as_str()));
    }
    if let Some(fav) = patch.is_favorite {
        row.insert("is_favorite".into(), Value::from(fav));
    }
    if let Some(collapsed) = patch.is_collapsed {
        row.insert("is_collapsed".into(), Value::from(collapsed));
    }
    match patch.holding {
        Some(Some(holding)) => {
            row.insert("holding_shares".into(), Value::from(holding.share));
            row.insert("holding_cost".into(), Value::from(holding.cost));
        }
        // The legacy amount would otherwise still read back as a holding.
        Some(None) => {
            for column in ["holding_shares", "holding_cost", "holding_amount"] {
                row.insert(column.into(), Value::Null);
            }
        }
        None => {}
    }
    if let Some(group) = &patch.group_id {
        let value = group.as_deref().map_or(Value::Null, Value::from);
        row.insert("group_id".into(), value);
    }
    if let Some(order) = patch.sort_order {
        row.insert("sort_order".into(), Value::from(order));
    }
    row
}

/// Full row for a locally tracked fund at list position `index`.
pub fn local_fund_row(user: &UserId, fund: &LocalFund, index: usize, snapshot: &LocalSnapshot) -> Row {
    let mut row = new_fund_row(user, &NewFund::new(fund.code.as_str(), fund.name.as_str()));
    let patch = FundPatch {
        name: None,
        is_favorite: Some(snapshot.favorites.contains(&fund.code)),
        is_collapsed: Some(snapshot.collapsed_codes.contains(&fund.code)),
        holding: snapshot.holdings.get(&fund.code).copied().map(Some),
        group_id: snapshot.group_of(&fund.code).map(|g| Some(g.to_string())),
        sort_order: Some(index as i64),
    };
    row.extend(fund_patch_to_row(&patch));
    row
}

/// Rebuilds the favorites/collapsed sets and holdings map from a fund list.
pub fn full_funds_data(funds: Vec<Fund>) -> FullFundsData {
    let mut data = FullFundsData::default();
    for fund in &funds {
        if fund.is_favorite {
            data.favorites.insert(fund.code.clone());
        }
        if fund.is_collapsed {
            data.collapsed_codes.insert(fund.code.clone());
        }
        if let Some(holding) = fund.holding {
            data.holdings.insert(fund.code.clone(), holding);
        }
    }
    data.funds = funds;
    data
}

// ── Groups ──

pub fn group_from_row(row: GroupRow) -> Group {
    Group {
        id: row.group_id,
        name: row.name,
        sort_order: row.sort_order,
    }
}

pub fn group_row(user: &UserId, group: &NewGroup, sort_order: i64) -> Row {
    let mut row = base_row(user);
    row.insert("group_id".into(), Value::from(group.id.as_str()));
    row.insert("name".into(), Value::from(group.name.as_str()));
    row.insert("sort_order".into(), Value::from(sort_order));
    row
}

// ── Settings ──

pub fn settings_from_row(row: SettingsRow) -> Settings {
    Settings {
        refresh_ms: row
            .refresh_interval
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_REFRESH_MS, |ms| ms as u64),
        view_mode: row
            .view_mode
            .as_deref()
            .map(ViewMode::parse)
            .unwrap_or_default(),
    }
}

pub fn settings_patch_to_row(user: &UserId, patch: &SettingsPatch) -> Row {
    let mut row = base_row(user);
    if let Some(ms) = patch.refresh_ms {
        row.insert("refresh_interval".into(), Value::from(ms));
    }
    if let Some(mode) = patch.view_mode {
        row.insert("view_mode".into(), Value::from(mode.as_str()));
    }
    row
}

pub fn default_settings_row(user: &UserId) -> Row {
    let defaults = Settings::default();
    settings_patch_to_row(
        user,
        &SettingsPatch {
            refresh_ms: Some(defaults.refresh_ms),
            view_mode: Some(defaults.view_mode),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fund_row(shares: Option<f64>, cost: Option<f64>, amount: Option<f64>) -> FundRow {
        FundRow {
            user_id: "u".into(),
            fund_code: "000001".into(),
            holding_shares: shares,
            holding_cost: cost,
            holding_amount: amount,
            ..Default::default()
        }
    }

    #[test]
    fn shares_win_over_legacy_amount() {
        let h = holding_from_row(&fund_row(Some(5.0), Some(10.0), Some(50.0)));
        assert_eq!(h, Some(Holding::new(5.0, 10.0)));
    }

    #[test]
    fn legacy_amount_maps_to_zero_holding() {
        let h = holding_from_row(&fund_row(None, None, Some(50.0)));
        assert_eq!(h, Some(Holding::new(0.0, 0.0)));
    }

    #[test]
    fn missing_cost_is_zero() {
        let h = holding_from_row(&fund_row(Some(3.0), None, None));
        assert_eq!(h, Some(Holding::new(3.0, 0.0)));
    }

    #[test]
    fn no_holding_columns_no_holding() {
        assert_eq!(holding_from_row(&fund_row(None, None, None)), None);
    }

    #[test]
    fn empty_patch_touches_nothing() {
        assert!(fund_patch_to_row(&FundPatch::default()).is_empty());
    }

    #[test]
    fn patch_maps_column_names() {
        let row = fund_patch_to_row(&FundPatch {
            name: Some("New".into()),
            holding: Some(Some(Holding::new(1.0, 2.0))),
            ..Default::default()
        });
        assert_eq!(row.len(), 3);
        assert_eq!(row["fund_name"], "New");
        assert_eq!(row["holding_shares"], 1.0);
        assert_eq!(row["holding_cost"], 2.0);
    }

    #[test]
    fn clearing_patch_writes_nulls() {
        let row = fund_patch_to_row(&FundPatch {
            group_id: Some(None),
            holding: Some(None),
            ..Default::default()
        });
        assert_eq!(row.len(), 4);
        assert_eq!(row["group_id"], Value::Null);
        assert_eq!(row["holding_shares"], Value::Null);
        assert_eq!(row["holding_cost"], Value::Null);
        assert_eq!(row["holding_amount"], Value::Null);
    }

    #[test]
    fn lenient_settings_row_decodes() {
        let row: SettingsRow = decode_row(
            serde_json::json!({"user_id": "u", "refresh_interval": "15000", "view_mode": "list"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        let s = settings_from_row(row);
        assert_eq!(s.refresh_ms, 15_000);
        assert_eq!(s.view_mode, ViewMode::List);
    }

    #[test]
    fn settings_row_defaults() {
        let s = settings_from_row(SettingsRow {
            user_id: "u".into(),
            refresh_interval: None,
            view_mode: Some("list".into()),
        });
        assert_eq!(s.refresh_ms, DEFAULT_REFRESH_MS);
        assert_eq!(s.view_mode, ViewMode::List);
    }

    #[test]
    fn settings_patch_is_sparse() {
        let row = settings_patch_to_row(
            &UserId::from("u"),
            &SettingsPatch {
                refresh_ms: Some(5000),
                view_mode: None,
            },
        );
        assert_eq!(row.len(), 2);
        assert_eq!(row["refresh_interval"], 5000);
    }
}
