use fundpal_cloud::{
    FundService, GroupService, MemoryBackend, Row, SettingsService, Table,
};
use fundpal_types::{FundPatch, Holding, NewFund, NewGroup, Settings, SettingsPatch, UserId, ViewMode};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn user() -> UserId {
    UserId::from("u1")
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn setup() -> (Arc<MemoryBackend>, FundService, GroupService, SettingsService) {
    let backend = Arc::new(MemoryBackend::new());
    (
        backend.clone(),
        FundService::new(backend.clone()),
        GroupService::new(backend.clone()),
        SettingsService::new(backend),
    )
}

// ── Funds ──

#[tokio::test]
async fn add_fund_twice_keeps_one_row_with_latest_name() {
    let (backend, funds, _, _) = setup();

    funds.add_fund(&user(), &NewFund::new("000001", "Old")).await.unwrap();
    let fund = funds.add_fund(&user(), &NewFund::new("000001", "New")).await.unwrap();

    assert_eq!(fund.name, "New");
    assert_eq!(backend.row_count(Table::Funds), 1);
    let listed = funds.get_funds(&user()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "New");
}

#[tokio::test]
async fn add_fund_keeps_other_columns_on_rename() {
    let (_, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("000001", "A")).await.unwrap();
    funds.toggle_favorite(&user(), "000001", true).await.unwrap();

    let fund = funds.add_fund(&user(), &NewFund::new("000001", "B")).await.unwrap();
    assert!(fund.is_favorite);
}

#[tokio::test]
async fn funds_are_scoped_to_user() {
    let (_, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("000001", "Mine")).await.unwrap();
    funds
        .add_fund(&UserId::from("u2"), &NewFund::new("000001", "Theirs"))
        .await
        .unwrap();

    let mine = funds.get_funds(&user()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].name, "Mine");
}

#[tokio::test]
async fn delete_missing_fund_succeeds() {
    let (_, funds, _, _) = setup();
    assert!(funds.delete_fund(&user(), "999999").await);
}

#[tokio::test]
async fn delete_fund_removes_row() {
    let (backend, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("000001", "A")).await.unwrap();
    assert!(funds.delete_fund(&user(), "000001").await);
    assert_eq!(backend.row_count(Table::Funds), 0);
}

#[tokio::test]
async fn delete_fund_failure_is_false() {
    let (backend, funds, _, _) = setup();
    backend.set_failing(Table::Funds, true);
    assert!(!funds.delete_fund(&user(), "000001").await);
}

#[tokio::test]
async fn update_funds_order_assigns_positions() {
    let (_, funds, _, _) = setup();
    for code in ["C", "A", "B"] {
        funds.add_fund(&user(), &NewFund::new(code, code)).await.unwrap();
    }

    assert!(funds.update_funds_order(&user(), &["A", "B", "C"]).await);

    let listed = funds.get_funds(&user()).await.unwrap();
    let order: Vec<(&str, i64)> = listed
        .iter()
        .map(|f| (f.code.as_str(), f.sort_order))
        .collect();
    assert_eq!(order, vec![("A", 0), ("B", 1), ("C", 2)]);
}

#[tokio::test]
async fn update_funds_order_stops_on_failure() {
    let (backend, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("A", "A")).await.unwrap();
    backend.set_failing(Table::Funds, true);
    let before = backend.call_count();

    assert!(!funds.update_funds_order(&user(), &["A", "B", "C"]).await);
    assert_eq!(backend.call_count() - before, 1);
}

#[tokio::test]
async fn get_funds_orders_ties_by_creation() {
    let (backend, funds, _, _) = setup();
    backend.seed(
        Table::Funds,
        row(json!({"user_id": "u1", "fund_code": "late", "sort_order": 0, "created_at": "2024-02-01T00:00:00Z"})),
    );
    backend.seed(
        Table::Funds,
        row(json!({"user_id": "u1", "fund_code": "early", "sort_order": 0, "created_at": "2024-01-01T00:00:00Z"})),
    );
    backend.seed(
        Table::Funds,
        row(json!({"user_id": "u1", "fund_code": "first", "sort_order": -1, "created_at": "2024-03-01T00:00:00Z"})),
    );

    let codes: Vec<String> = funds
        .get_funds(&user())
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.code)
        .collect();
    assert_eq!(codes, vec!["first", "early", "late"]);
}

#[tokio::test]
async fn update_fund_is_sparse() {
    let (_, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("000001", "A")).await.unwrap();
    funds
        .update_fund(
            &user(),
            "000001",
            &FundPatch::set_holding(Holding::new(2.0, 3.0)),
        )
        .await
        .unwrap();

    let fund = funds
        .update_fund(
            &user(),
            "000001",
            &FundPatch {
                is_collapsed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(fund.name, "A");
    assert!(fund.is_collapsed);
    assert_eq!(fund.holding, Some(Holding::new(2.0, 3.0)));
}

#[tokio::test]
async fn group_can_be_assigned_then_cleared() {
    let (_, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("000001", "A")).await.unwrap();

    let assigned = funds
        .update_fund(&user(), "000001", &FundPatch::set_group("g1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assigned.group_id.as_deref(), Some("g1"));

    let cleared = funds
        .update_fund(&user(), "000001", &FundPatch::clear_group())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cleared.group_id, None);
    assert_eq!(funds.get_funds(&user()).await.unwrap()[0].group_id, None);
}

#[tokio::test]
async fn holding_can_be_cleared_including_legacy_amount() {
    let (backend, funds, _, _) = setup();
    backend.seed(
        Table::Funds,
        row(json!({
            "user_id": "u1",
            "fund_code": "000001",
            "fund_name": "A",
            "holding_shares": 4,
            "holding_cost": 1.5,
            "holding_amount": 6
        })),
    );

    let fund = funds
        .update_fund(&user(), "000001", &FundPatch::clear_holding())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fund.holding, None);
    assert_eq!(fund.name, "A");

    let data = funds.get_full_funds_data(&user()).await;
    assert!(data.holdings.is_empty());
}

#[tokio::test]
async fn string_sort_order_still_loads() {
    let (backend, funds, _, _) = setup();
    backend.seed(
        Table::Funds,
        row(json!({"user_id": "u1", "fund_code": "B", "fund_name": "B", "sort_order": "1"})),
    );
    backend.seed(
        Table::Funds,
        row(json!({"user_id": "u1", "fund_code": "A", "fund_name": "A", "sort_order": 0.0})),
    );

    let loaded = funds.get_funds(&user()).await.unwrap();
    let orders: Vec<i64> = loaded.iter().map(|f| f.sort_order).collect();
    assert_eq!(orders.len(), 2);
    assert!(orders.contains(&0) && orders.contains(&1));
}

#[tokio::test]
async fn update_missing_fund_is_none() {
    let (_, funds, _, _) = setup();
    let result = funds
        .toggle_collapsed(&user(), "nope", true)
        .await
        .unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn empty_patch_reads_current_row() {
    let (backend, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("000001", "A")).await.unwrap();
    let fund = funds
        .update_fund(&user(), "000001", &FundPatch::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fund.name, "A");
    assert_eq!(backend.row_count(Table::Funds), 1);
}

#[tokio::test]
async fn full_funds_data_rebuilds_views() {
    let (backend, funds, _, _) = setup();
    backend.seed(
        Table::Funds,
        row(json!({
            "user_id": "u1", "fund_code": "A", "fund_name": "Alpha",
            "is_favorite": true, "holding_shares": 5, "holding_cost": 10, "sort_order": 0
        })),
    );
    backend.seed(
        Table::Funds,
        row(json!({
            "user_id": "u1", "fund_code": "B", "fund_name": "Beta",
            "is_collapsed": true, "holding_amount": 50, "sort_order": 1
        })),
    );
    backend.seed(
        Table::Funds,
        row(json!({"user_id": "u1", "fund_code": "C", "fund_name": "Gamma", "sort_order": 2})),
    );

    let data = funds.get_full_funds_data(&user()).await;

    assert_eq!(data.funds.len(), 3);
    assert_eq!(data.favorites.iter().collect::<Vec<_>>(), vec!["A"]);
    assert_eq!(data.collapsed_codes.iter().collect::<Vec<_>>(), vec!["B"]);
    assert_eq!(data.holdings.get("A"), Some(&Holding::new(5.0, 10.0)));
    assert_eq!(data.holdings.get("B"), Some(&Holding::new(0.0, 0.0)));
    assert_eq!(data.holdings.get("C"), None);
}

#[tokio::test]
async fn full_funds_data_empty_on_failure() {
    let (backend, funds, _, _) = setup();
    funds.add_fund(&user(), &NewFund::new("A", "A")).await.unwrap();
    backend.set_failing(Table::Funds, true);

    let data = funds.get_full_funds_data(&user()).await;
    assert!(data.funds.is_empty());
    assert!(data.holdings.is_empty());
}

#[tokio::test]
async fn get_funds_failure_is_error() {
    let (backend, funds, _, _) = setup();
    backend.set_failing(Table::Funds, true);
    assert!(funds.get_funds(&user()).await.is_err());
}

// ── Groups ──

#[tokio::test]
async fn save_empty_groups_clears_all() {
    let (_, _, groups, _) = setup();
    assert!(
        groups
            .save_groups(&user(), &[NewGroup::new("g1", "One")])
            .await
    );
    assert!(groups.save_groups(&user(), &[]).await);
    assert_eq!(groups.get_groups(&user()).await.unwrap(), vec![]);
}

#[tokio::test]
async fn save_groups_replaces_with_positions() {
    let (backend, _, groups, _) = setup();
    groups
        .save_groups(&user(), &[NewGroup::new("old", "Old")])
        .await;
    assert!(
        groups
            .save_groups(
                &user(),
                &[NewGroup::new("g2", "Two"), NewGroup::new("g1", "One")],
            )
            .await
    );

    let listed = groups.get_groups(&user()).await.unwrap();
    let ids: Vec<(&str, i64)> = listed.iter().map(|g| (g.id.as_str(), g.sort_order)).collect();
    assert_eq!(ids, vec![("g2", 0), ("g1", 1)]);
    assert_eq!(backend.row_count(Table::Groups), 2);
}

#[tokio::test]
async fn save_groups_insert_failure_leaves_nothing_behind() {
    let (backend, _, groups, _) = setup();
    groups
        .save_groups(&user(), &[NewGroup::new("g1", "One")])
        .await;

    // Duplicate ids make the bulk insert fail after the delete went through.
    let saved = groups
        .save_groups(&user(), &[NewGroup::new("dup", "A"), NewGroup::new("dup", "B")])
        .await;
    assert!(!saved);
    assert_eq!(backend.row_count(Table::Groups), 0);
}

#[tokio::test]
async fn add_group_appends_after_max() {
    let (_, _, groups, _) = setup();
    let first = groups.add_group(&user(), &NewGroup::new("g1", "One")).await.unwrap();
    assert_eq!(first.sort_order, 0);

    groups
        .save_groups(
            &user(),
            &[
                NewGroup::new("g1", "One"),
                NewGroup::new("g2", "Two"),
                NewGroup::new("g3", "Three"),
            ],
        )
        .await;
    let added = groups.add_group(&user(), &NewGroup::new("g4", "Four")).await.unwrap();
    assert_eq!(added.sort_order, 3);
}

#[tokio::test]
async fn add_duplicate_group_conflicts() {
    let (_, _, groups, _) = setup();
    groups.add_group(&user(), &NewGroup::new("g1", "One")).await.unwrap();
    let err = groups
        .add_group(&user(), &NewGroup::new("g1", "Again"))
        .await
        .unwrap_err();
    assert!(matches!(err, fundpal_cloud::CloudError::Conflict(_)));
}

#[tokio::test]
async fn rename_and_delete_group() {
    let (_, _, groups, _) = setup();
    groups.add_group(&user(), &NewGroup::new("g1", "One")).await.unwrap();

    let renamed = groups.rename_group(&user(), "g1", "Uno").await.unwrap().unwrap();
    assert_eq!(renamed.name, "Uno");
    assert_eq!(groups.rename_group(&user(), "nope", "x").await.unwrap(), None);

    assert!(groups.delete_group(&user(), "g1").await);
    assert!(groups.delete_group(&user(), "g1").await);
    assert!(groups.get_groups(&user()).await.unwrap().is_empty());
}

// ── Settings ──

#[tokio::test]
async fn get_settings_creates_default_row_once() {
    let (backend, _, _, settings) = setup();

    let first = settings.get_settings(&user()).await;
    let second = settings.get_settings(&user()).await;

    assert_eq!(first, Settings { refresh_ms: 30_000, view_mode: ViewMode::Card });
    assert_eq!(second, first);
    assert_eq!(backend.row_count(Table::UserSettings), 1);
}

#[tokio::test]
async fn get_settings_failure_falls_back_without_insert() {
    let (backend, _, _, settings) = setup();
    backend.set_failing(Table::UserSettings, true);

    assert_eq!(settings.get_settings(&user()).await, Settings::default());
    backend.set_failing(Table::UserSettings, false);
    assert_eq!(backend.row_count(Table::UserSettings), 0);
}

#[tokio::test]
async fn update_settings_creates_then_merges() {
    let (backend, _, _, settings) = setup();

    let created = settings
        .update_settings(
            &user(),
            &SettingsPatch {
                refresh_ms: Some(60_000),
                view_mode: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.refresh_ms, 60_000);
    assert_eq!(created.view_mode, ViewMode::Card);

    let merged = settings
        .update_settings(
            &user(),
            &SettingsPatch {
                refresh_ms: None,
                view_mode: Some(ViewMode::List),
            },
        )
        .await
        .unwrap();
    assert_eq!(merged, Settings { refresh_ms: 60_000, view_mode: ViewMode::List });
    assert_eq!(backend.row_count(Table::UserSettings), 1);

    assert_eq!(settings.get_settings(&user()).await, merged);
}

#[tokio::test]
async fn unknown_view_mode_reads_as_card() {
    let (backend, _, _, settings) = setup();
    backend.seed(
        Table::UserSettings,
        row(json!({"user_id": "u1", "refresh_interval": 15000, "view_mode": "grid"})),
    );
    let s = settings.get_settings(&user()).await;
    assert_eq!(s, Settings { refresh_ms: 15_000, view_mode: ViewMode::Card });
}

#[tokio::test]
async fn string_refresh_interval_keeps_view_mode() {
    let (backend, _, _, settings) = setup();
    backend.seed(
        Table::UserSettings,
        row(json!({"user_id": "u1", "refresh_interval": "15000", "view_mode": "list"})),
    );
    let s = settings.get_settings(&user()).await;
    assert_eq!(s, Settings { refresh_ms: 15_000, view_mode: ViewMode::List });
}

#[tokio::test]
async fn fractional_refresh_interval_truncates() {
    let (backend, _, _, settings) = setup();
    backend.seed(
        Table::UserSettings,
        row(json!({"user_id": "u1", "refresh_interval": 15000.0, "view_mode": "list"})),
    );
    let s = settings.get_settings(&user()).await;
    assert_eq!(s, Settings { refresh_ms: 15_000, view_mode: ViewMode::List });
}

#[tokio::test]
async fn update_settings_over_string_row_succeeds() {
    let (backend, _, _, settings) = setup();
    backend.seed(
        Table::UserSettings,
        row(json!({"user_id": "u1", "refresh_interval": "15000", "view_mode": "card"})),
    );
    let updated = settings
        .update_settings(
            &user(),
            &SettingsPatch {
                refresh_ms: None,
                view_mode: Some(ViewMode::List),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated, Settings { refresh_ms: 15_000, view_mode: ViewMode::List });
}
