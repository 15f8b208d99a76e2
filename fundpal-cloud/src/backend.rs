//! The seam between the services and a concrete backend.

use crate::error::CloudResult;
use crate::query::{Filter, Row, Select, Table};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Capacity of a change feed channel. Events beyond it are dropped.
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// Receiving end of a change feed. Dropping it releases the feed.
pub type ChangeStream = mpsc::Receiver<ChangeEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Row after the change (absent for deletes).
    pub new: Option<Row>,
    /// Row before the change (absent for inserts).
    pub old: Option<Row>,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn insert(table: Table, new: Row) -> Self {
        Self::build(table, ChangeKind::Insert, Some(new), None)
    }

    pub fn update(table: Table, old: Row, new: Row) -> Self {
        Self::build(table, ChangeKind::Update, Some(new), Some(old))
    }

    pub fn delete(table: Table, old: Row) -> Self {
        Self::build(table, ChangeKind::Delete, None, Some(old))
    }

    fn build(table: Table, kind: ChangeKind, new: Option<Row>, old: Option<Row>) -> Self {
        Self {
            table,
            kind,
            new,
            old,
            observed_at: Utc::now(),
        }
    }

    /// Whether `filter` holds for the new row, or the old row for deletes.
    pub fn matches(&self, filter: &Filter) -> bool {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .is_some_and(|row| filter.matches(row))
    }
}

/// Table operations the services are built on. Every method issues one
/// remote call.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, query: &Select) -> CloudResult<Vec<Row>>;

    /// Exactly one row; zero rows is [`CloudError::NotFound`](crate::CloudError::NotFound).
    async fn select_single(&self, query: &Select) -> CloudResult<Row>;

    async fn insert(&self, table: Table, rows: Vec<Row>) -> CloudResult<Vec<Row>>;

    /// Insert-or-merge keyed on `on_conflict`. Only the columns present in
    /// each row are written on the update path.
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        on_conflict: &[&str],
    ) -> CloudResult<Vec<Row>>;

    /// Merges `patch` into every row matching all `filters`, returning the
    /// updated rows.
    async fn update(&self, table: Table, filters: &[Filter], patch: Row) -> CloudResult<Vec<Row>>;

    /// Deletes every row matching all `filters`. Matching nothing is not an
    /// error.
    async fn delete(&self, table: Table, filters: &[Filter]) -> CloudResult<()>;

    /// Opens a change feed for rows of `table` matching `filter`.
    async fn watch(&self, table: Table, filter: Filter) -> CloudResult<ChangeStream>;
}
