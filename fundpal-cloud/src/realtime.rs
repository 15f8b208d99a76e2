//! Per-user change subscriptions.
//!
//! Each subscription owns a forwarding task that drains the backend's
//! change feed into the caller's callback. Events are delivered at most
//! once, in feed order, with nothing buffered beyond the feed channel.

use crate::backend::{Backend, ChangeEvent};
use crate::error::CloudResult;
use crate::query::{Filter, Table};
use fundpal_types::UserId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Live subscription. Dropping it releases the change feed.
pub struct Subscription {
    table: Table,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn table(&self) -> Table {
        self.table
    }

    pub fn unsubscribe(self) {
        debug!("unsubscribing from {}", self.table);
        // Drop aborts the task, which drops the feed receiver.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
pub struct RealtimeService {
    backend: Arc<dyn Backend>,
}

impl RealtimeService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn subscribe_funds<F>(&self, user: &UserId, callback: F) -> CloudResult<Subscription>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        self.subscribe(Table::Funds, user, callback).await
    }

    pub async fn subscribe_groups<F>(&self, user: &UserId, callback: F) -> CloudResult<Subscription>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        self.subscribe(Table::Groups, user, callback).await
    }

    pub async fn subscribe_settings<F>(&self, user: &UserId, callback: F) -> CloudResult<Subscription>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        self.subscribe(Table::UserSettings, user, callback).await
    }

    async fn subscribe<F>(&self, table: Table, user: &UserId, mut callback: F) -> CloudResult<Subscription>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let mut feed = self
            .backend
            .watch(table, Filter::eq("user_id", user.as_str()))
            .await?;
        info!("subscribed to {table} changes for {user}");

        let task = tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                callback(event);
            }
            debug!("change feed for {table} closed");
        });

        Ok(Subscription { table, task })
    }
}
