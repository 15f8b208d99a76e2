use fundpal_cloud::{
    ChangeEvent, ChangeKind, FundService, GroupService, MemoryBackend, RealtimeService,
    SettingsService, Table,
};
use fundpal_types::{NewFund, NewGroup, SettingsPatch, UserId, ViewMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn user() -> UserId {
    UserId::from("u1")
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

fn collector() -> (
    impl FnMut(ChangeEvent) + Send + 'static,
    mpsc::UnboundedReceiver<ChangeEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event| {
            let _ = tx.send(event);
        },
        rx,
    )
}

#[tokio::test]
async fn fund_changes_reach_callback() {
    let backend = Arc::new(MemoryBackend::new());
    let realtime = RealtimeService::new(backend.clone());
    let funds = FundService::new(backend);
    let (callback, mut rx) = collector();
    let _sub = realtime.subscribe_funds(&user(), callback).await.unwrap();

    funds.add_fund(&user(), &NewFund::new("000001", "Alpha")).await.unwrap();
    funds.add_fund(&user(), &NewFund::new("000001", "Beta")).await.unwrap();
    funds.delete_fund(&user(), "000001").await;

    let insert = next_event(&mut rx).await;
    assert_eq!(insert.table, Table::Funds);
    assert_eq!(insert.kind, ChangeKind::Insert);
    assert_eq!(insert.new.as_ref().unwrap()["fund_name"], "Alpha");

    let update = next_event(&mut rx).await;
    assert_eq!(update.kind, ChangeKind::Update);
    assert_eq!(update.old.as_ref().unwrap()["fund_name"], "Alpha");
    assert_eq!(update.new.as_ref().unwrap()["fund_name"], "Beta");

    let delete = next_event(&mut rx).await;
    assert_eq!(delete.kind, ChangeKind::Delete);
    assert!(delete.new.is_none());
}

#[tokio::test]
async fn other_users_changes_are_filtered() {
    let backend = Arc::new(MemoryBackend::new());
    let realtime = RealtimeService::new(backend.clone());
    let funds = FundService::new(backend);
    let (callback, mut rx) = collector();
    let _sub = realtime.subscribe_funds(&user(), callback).await.unwrap();

    funds
        .add_fund(&UserId::from("someone-else"), &NewFund::new("000001", "X"))
        .await
        .unwrap();
    funds.add_fund(&user(), &NewFund::new("000002", "Mine")).await.unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event.new.unwrap()["fund_code"], "000002");
}

#[tokio::test]
async fn group_and_settings_subscriptions() {
    let backend = Arc::new(MemoryBackend::new());
    let realtime = RealtimeService::new(backend.clone());
    let groups = GroupService::new(backend.clone());
    let settings = SettingsService::new(backend);

    let (on_group, mut group_rx) = collector();
    let (on_settings, mut settings_rx) = collector();
    let _g = realtime.subscribe_groups(&user(), on_group).await.unwrap();
    let _s = realtime.subscribe_settings(&user(), on_settings).await.unwrap();

    groups.add_group(&user(), &NewGroup::new("g1", "One")).await.unwrap();
    settings
        .update_settings(
            &user(),
            &SettingsPatch {
                refresh_ms: None,
                view_mode: Some(ViewMode::List),
            },
        )
        .await
        .unwrap();

    let g = next_event(&mut group_rx).await;
    assert_eq!(g.table, Table::Groups);
    assert_eq!(g.kind, ChangeKind::Insert);

    let s = next_event(&mut settings_rx).await;
    assert_eq!(s.table, Table::UserSettings);
    assert_eq!(s.new.unwrap()["view_mode"], "list");
}

#[tokio::test]
async fn no_events_after_unsubscribe() {
    let backend = Arc::new(MemoryBackend::new());
    let realtime = RealtimeService::new(backend.clone());
    let funds = FundService::new(backend);
    let (callback, mut rx) = collector();
    let sub = realtime.subscribe_funds(&user(), callback).await.unwrap();

    funds.add_fund(&user(), &NewFund::new("A", "A")).await.unwrap();
    next_event(&mut rx).await;

    sub.unsubscribe();
    tokio::task::yield_now().await;
    funds.add_fund(&user(), &NewFund::new("B", "B")).await.unwrap();

    // The forwarding task owned the only sender; once it is gone the
    // channel closes without delivering anything else.
    let rest = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("channel should close");
    assert!(rest.is_none());
}

#[tokio::test]
async fn subscribe_fails_when_backend_fails() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_failing(Table::Funds, true);
    let realtime = RealtimeService::new(backend);
    assert!(realtime.subscribe_funds(&user(), |_| {}).await.is_err());
}
