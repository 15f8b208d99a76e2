//! Change feed over a plain REST gateway.
//!
//! Polls the watched rows on an interval and diffs consecutive snapshots by
//! table key, emitting insert, update and delete events for what changed.
//! The feed task exits once the receiving end is dropped.

use crate::backend::{Backend, CHANGE_FEED_CAPACITY, ChangeEvent, ChangeStream};
use crate::error::CloudResult;
use crate::query::{Filter, Row, Select, Table, row_key};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Opens a polling feed. The initial snapshot is fetched before returning,
/// so a failing backend surfaces here rather than in the task.
pub(crate) async fn open(
    backend: Arc<dyn Backend>,
    table: Table,
    filter: Filter,
    interval: Duration,
) -> CloudResult<ChangeStream> {
    let query = Select::from(table).eq(filter.column.clone(), filter.value.clone());
    let initial = backend.select(&query).await?;

    let (tx, rx) = mpsc::channel(CHANGE_FEED_CAPACITY);
    let mut feed = PollFeed {
        backend,
        query,
        snapshot: index(table, initial),
        tx,
        interval,
    };
    tokio::spawn(async move { feed.run().await });

    Ok(rx)
}

struct PollFeed {
    backend: Arc<dyn Backend>,
    query: Select,
    snapshot: HashMap<String, Row>,
    tx: mpsc::Sender<ChangeEvent>,
    interval: Duration,
}

impl PollFeed {
    async fn run(&mut self) {
        info!("change feed started for {}", self.query.table);

        let mut poll_interval = tokio::time::interval(self.interval);
        // Skip first immediate tick
        poll_interval.tick().await;

        loop {
            tokio::select! {
                _ = self.tx.closed() => break,
                _ = poll_interval.tick() => {
                    if let Err(e) = self.poll().await {
                        warn!("change feed poll on {} failed: {e}", self.query.table);
                    }
                }
            }
        }

        info!("change feed stopped for {}", self.query.table);
    }

    async fn poll(&mut self) -> CloudResult<()> {
        let rows = self.backend.select(&self.query).await?;
        let events = diff(self.query.table, &mut self.snapshot, rows);
        if !events.is_empty() {
            debug!("{} changes on {}", events.len(), self.query.table);
        }
        for event in events {
            if let Err(e) = self.tx.try_send(event) {
                warn!("dropping change event on {}: {e}", self.query.table);
            }
        }
        Ok(())
    }
}

fn index(table: Table, rows: Vec<Row>) -> HashMap<String, Row> {
    rows.into_iter().map(|r| (row_key(table, &r), r)).collect()
}

/// Replaces `snapshot` with `rows`, returning what changed between them.
/// Inserts and updates come in `rows` order, deletes after.
pub(crate) fn diff(table: Table, snapshot: &mut HashMap<String, Row>, rows: Vec<Row>) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut next = HashMap::with_capacity(rows.len());

    for row in rows {
        let key = row_key(table, &row);
        match snapshot.remove(&key) {
            None => events.push(ChangeEvent::insert(table, row.clone())),
            Some(old) if old != row => events.push(ChangeEvent::update(table, old, row.clone())),
            Some(_) => {}
        }
        next.insert(key, row);
    }

    let mut removed: Vec<(String, Row)> = snapshot.drain().collect();
    removed.sort_by(|a, b| a.0.cmp(&b.0));
    events.extend(removed.into_iter().map(|(_, old)| ChangeEvent::delete(table, old)));

    *snapshot = next;
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChangeKind;
    use serde_json::json;

    fn fund(code: &str, name: &str) -> Row {
        json!({ "user_id": "u", "fund_code": code, "fund_name": name })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn unchanged_snapshot_emits_nothing() {
        let mut snap = index(Table::Funds, vec![fund("1", "a")]);
        let events = diff(Table::Funds, &mut snap, vec![fund("1", "a")]);
        assert!(events.is_empty());
    }

    #[test]
    fn detects_insert_update_delete() {
        let mut snap = index(Table::Funds, vec![fund("1", "a"), fund("2", "b")]);
        let events = diff(Table::Funds, &mut snap, vec![fund("1", "renamed"), fund("3", "c")]);

        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Update, ChangeKind::Insert, ChangeKind::Delete]);
        assert_eq!(events[0].old.as_ref().unwrap()["fund_name"], "a");
        assert_eq!(events[0].new.as_ref().unwrap()["fund_name"], "renamed");
        assert_eq!(events[2].old.as_ref().unwrap()["fund_code"], "2");
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn snapshot_tracks_latest_rows() {
        let mut snap = HashMap::new();
        diff(Table::Funds, &mut snap, vec![fund("1", "a")]);
        let events = diff(Table::Funds, &mut snap, vec![]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Delete);
        assert!(snap.is_empty());
    }
}
