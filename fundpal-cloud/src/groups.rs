//! Group CRUD over the `groups` table.

use crate::backend::Backend;
use crate::error::{CloudError, CloudResult};
use crate::mapper;
use crate::query::{Filter, Row, Select, Table};
use fundpal_types::{Group, GroupRow, NewGroup, UserId};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

fn decode_group(row: Row) -> CloudResult<Group> {
    let row: GroupRow = mapper::decode_row(row)?;
    Ok(mapper::group_from_row(row))
}

#[derive(Clone)]
pub struct GroupService {
    backend: Arc<dyn Backend>,
}

impl GroupService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn get_groups(&self, user: &UserId) -> CloudResult<Vec<Group>> {
        let query = Select::from(Table::Groups)
            .eq("user_id", user.as_str())
            .order_by("sort_order", true);

        let rows = self
            .backend
            .select(&query)
            .await
            .inspect_err(|e| warn!("failed to load groups for {user}: {e}"))?;
        let rows: Vec<GroupRow> = mapper::decode_rows(rows)?;
        Ok(rows.into_iter().map(mapper::group_from_row).collect())
    }

    /// Replaces every group of `user` with `groups`, in order.
    ///
    /// Two remote calls: delete all, then insert. Readers in between see no
    /// groups, and a failed insert leaves none.
    pub async fn save_groups(&self, user: &UserId, groups: &[NewGroup]) -> bool {
        if let Err(e) = self
            .backend
            .delete(Table::Groups, &[Filter::eq("user_id", user.as_str())])
            .await
        {
            warn!("failed to clear groups for {user}: {e}");
            return false;
        }

        if groups.is_empty() {
            return true;
        }

        let rows = groups
            .iter()
            .enumerate()
            .map(|(index, group)| mapper::group_row(user, group, index as i64))
            .collect();
        match self.backend.insert(Table::Groups, rows).await {
            Ok(_) => {
                debug!("saved {} groups for {user}", groups.len());
                true
            }
            Err(e) => {
                warn!("failed to insert groups for {user}: {e}");
                false
            }
        }
    }

    /// Appends a group after the current last one.
    pub async fn add_group(&self, user: &UserId, group: &NewGroup) -> CloudResult<Group> {
        let last = Select::from(Table::Groups)
            .eq("user_id", user.as_str())
            .order_by("sort_order", false)
            .limit(1);
        let rows = self
            .backend
            .select(&last)
            .await
            .inspect_err(|e| warn!("failed to read group order for {user}: {e}"))?;
        let next_order = match rows.into_iter().next() {
            Some(row) => mapper::decode_row::<GroupRow>(row)?.sort_order + 1,
            None => 0,
        };

        let rows = self
            .backend
            .insert(Table::Groups, vec![mapper::group_row(user, group, next_order)])
            .await
            .inspect_err(|e| warn!("failed to add group {}: {e}", group.id))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::NotFound(format!("group {} not returned", group.id)))?;
        decode_group(row)
    }

    /// `Ok(None)` when no such group exists.
    pub async fn rename_group(
        &self,
        user: &UserId,
        id: &str,
        name: &str,
    ) -> CloudResult<Option<Group>> {
        let mut patch = Row::new();
        patch.insert("name".into(), Value::from(name));

        let rows = self
            .backend
            .update(
                Table::Groups,
                &[Filter::eq("user_id", user.as_str()), Filter::eq("group_id", id)],
                patch,
            )
            .await
            .inspect_err(|e| warn!("failed to rename group {id}: {e}"))?;
        rows.into_iter().next().map(decode_group).transpose()
    }

    pub async fn delete_group(&self, user: &UserId, id: &str) -> bool {
        let filters = [Filter::eq("user_id", user.as_str()), Filter::eq("group_id", id)];
        match self.backend.delete(Table::Groups, &filters).await {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to delete group {id}: {e}");
                false
            }
        }
    }
}
