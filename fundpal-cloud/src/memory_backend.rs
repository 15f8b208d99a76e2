//! In-process backend with the same observable semantics as the REST
//! gateway: unique keys, upsert merging, ordering, change feeds.
//!
//! Used by the test suites and for offline sessions.

use crate::backend::{Backend, CHANGE_FEED_CAPACITY, ChangeEvent, ChangeStream};
use crate::error::{CloudError, CloudResult};
use crate::query::{Filter, Order, Row, Select, Table, filter_text, row_key};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct Watcher {
    table: Table,
    filter: Filter,
    tx: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Table, Vec<Row>>,
    next_id: i64,
    failing: HashSet<Table>,
    watchers: Vec<Watcher>,
    calls: usize,
}

impl MemoryState {
    fn check(&mut self, table: Table) -> CloudResult<()> {
        self.calls += 1;
        if self.failing.contains(&table) {
            return Err(CloudError::Api {
                status: 503,
                code: None,
                message: format!("table {table} unavailable"),
            });
        }
        Ok(())
    }

    fn rows_mut(&mut self, table: Table) -> &mut Vec<Row> {
        self.tables.entry(table).or_default()
    }

    fn with_defaults(&mut self, mut row: Row) -> Row {
        self.next_id += 1;
        row.entry("id").or_insert(Value::from(self.next_id));
        row.entry("created_at").or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        });
        row
    }

    fn notify(&mut self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        self.watchers.retain(|w| !w.tx.is_closed());
        for event in events {
            for watcher in &self.watchers {
                if watcher.table != event.table || !event.matches(&watcher.filter) {
                    continue;
                }
                if let Err(e) = watcher.tx.try_send(event.clone()) {
                    warn!("dropping {:?} event on {}: {e}", event.kind, event.table);
                }
            }
        }
    }
}

/// Backend holding every table in memory.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("recovering from poisoned memory backend mutex");
            poisoned.into_inner()
        })
    }

    /// Snapshot of every row in `table`, in insertion order.
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.lock().tables.get(&table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: Table) -> usize {
        self.lock().tables.get(&table).map_or(0, Vec::len)
    }

    /// Makes every operation on `table` fail until cleared.
    pub fn set_failing(&self, table: Table, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing.insert(table);
        } else {
            state.failing.remove(&table);
        }
    }

    /// Number of backend calls served (including failed ones).
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    /// Inserts a row as-is, bypassing key checks and change feeds.
    pub fn seed(&self, table: Table, row: Row) {
        let mut state = self.lock();
        let row = state.with_defaults(row);
        state.rows_mut(table).push(row);
    }
}

fn compare_column(a: &Row, b: &Row, order: &Order) -> Ordering {
    // Postgres default: nulls last ascending, first descending.
    let ord = match (a.get(&order.column), b.get(&order.column)) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => filter_text(x).cmp(&filter_text(y)),
    };
    if order.ascending { ord } else { ord.reverse() }
}

fn same_conflict_key(a: &Row, b: &Row, columns: &[&str]) -> bool {
    columns.iter().all(|c| {
        let left = a.get(*c).map(filter_text);
        left.is_some() && left == b.get(*c).map(filter_text)
    })
}

fn merge(target: &mut Row, patch: &Row) {
    for (k, v) in patch {
        target.insert(k.clone(), v.clone());
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, query: &Select) -> CloudResult<Vec<Row>> {
        let mut state = self.lock();
        state.check(query.table)?;
        let mut rows: Vec<Row> = state
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|o| compare_column(a, b, o))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn select_single(&self, query: &Select) -> CloudResult<Row> {
        let mut rows = self.select(query).await?;
        match rows.len() {
            0 => Err(CloudError::NotFound(format!("no row in {}", query.table))),
            1 => Ok(rows.remove(0)),
            n => Err(CloudError::Api {
                status: 406,
                code: None,
                message: format!("expected one row in {}, found {n}", query.table),
            }),
        }
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> CloudResult<Vec<Row>> {
        let mut state = self.lock();
        state.check(table)?;

        let mut seen: HashSet<String> = state
            .tables
            .get(&table)
            .map(|existing| existing.iter().map(|r| row_key(table, r)).collect())
            .unwrap_or_default();
        for row in &rows {
            if !seen.insert(row_key(table, row)) {
                return Err(CloudError::Conflict(format!(
                    "duplicate key in {table}: {}",
                    row_key(table, row).replace('\u{1f}', "/")
                )));
            }
        }

        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let row = state.with_defaults(row);
            state.rows_mut(table).push(row.clone());
            inserted.push(row);
        }
        debug!("inserted {} rows into {table}", inserted.len());
        let events = inserted
            .iter()
            .map(|r| ChangeEvent::insert(table, r.clone()))
            .collect();
        state.notify(events);
        Ok(inserted)
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        on_conflict: &[&str],
    ) -> CloudResult<Vec<Row>> {
        let mut state = self.lock();
        state.check(table)?;

        let mut written = Vec::with_capacity(rows.len());
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let existing = state
                .rows_mut(table)
                .iter()
                .position(|r| same_conflict_key(r, &row, on_conflict));
            match existing {
                Some(idx) => {
                    let target = &mut state.rows_mut(table)[idx];
                    let old = target.clone();
                    merge(target, &row);
                    let new = target.clone();
                    events.push(ChangeEvent::update(table, old, new.clone()));
                    written.push(new);
                }
                None => {
                    let row = state.with_defaults(row);
                    state.rows_mut(table).push(row.clone());
                    events.push(ChangeEvent::insert(table, row.clone()));
                    written.push(row);
                }
            }
        }
        state.notify(events);
        Ok(written)
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Row) -> CloudResult<Vec<Row>> {
        let mut state = self.lock();
        state.check(table)?;

        let mut updated = Vec::new();
        let mut events = Vec::new();
        for row in state.rows_mut(table).iter_mut() {
            if !filters.iter().all(|f| f.matches(row)) {
                continue;
            }
            let old = row.clone();
            merge(row, &patch);
            events.push(ChangeEvent::update(table, old, row.clone()));
            updated.push(row.clone());
        }
        state.notify(events);
        Ok(updated)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> CloudResult<()> {
        let mut state = self.lock();
        state.check(table)?;

        let rows = std::mem::take(state.rows_mut(table));
        let (removed, kept): (Vec<Row>, Vec<Row>) = rows
            .into_iter()
            .partition(|row| filters.iter().all(|f| f.matches(row)));
        *state.rows_mut(table) = kept;

        debug!("deleted {} rows from {table}", removed.len());
        let events = removed
            .into_iter()
            .map(|r| ChangeEvent::delete(table, r))
            .collect();
        state.notify(events);
        Ok(())
    }

    async fn watch(&self, table: Table, filter: Filter) -> CloudResult<ChangeStream> {
        let mut state = self.lock();
        state.check(table)?;
        let (tx, rx) = mpsc::channel(CHANGE_FEED_CAPACITY);
        state.watchers.push(Watcher { table, filter, tx });
        Ok(rx)
    }
}
