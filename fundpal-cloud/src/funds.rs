//! Fund CRUD over the `funds` table.

use crate::backend::Backend;
use crate::error::{CloudError, CloudResult};
use crate::mapper;
use crate::query::{Filter, Row, Select, Table};
use fundpal_types::{FullFundsData, Fund, FundPatch, FundRow, LocalSnapshot, NewFund, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

const FUND_CONFLICT: &[&str] = &["user_id", "fund_code"];

fn key_filters(user: &UserId, code: &str) -> [Filter; 2] {
    [
        Filter::eq("user_id", user.as_str()),
        Filter::eq("fund_code", code),
    ]
}

fn decode_fund(row: Row) -> CloudResult<Fund> {
    let row: FundRow = mapper::decode_row(row)?;
    Ok(mapper::fund_from_row(row))
}

#[derive(Clone)]
pub struct FundService {
    backend: Arc<dyn Backend>,
}

impl FundService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Every fund of `user`, by `sort_order` then `created_at`.
    pub async fn get_funds(&self, user: &UserId) -> CloudResult<Vec<Fund>> {
        let query = Select::from(Table::Funds)
            .eq("user_id", user.as_str())
            .order_by("sort_order", true)
            .order_by("created_at", true);

        let rows = self.backend.select(&query).await.inspect_err(|e| {
            warn!("failed to load funds for {user}: {e}");
        })?;
        let rows: Vec<FundRow> = mapper::decode_rows(rows)?;
        Ok(rows.into_iter().map(mapper::fund_from_row).collect())
    }

    /// Funds plus the favorites, collapsed and holdings views. Empty on
    /// failure.
    pub async fn get_full_funds_data(&self, user: &UserId) -> FullFundsData {
        match self.get_funds(user).await {
            Ok(funds) => mapper::full_funds_data(funds),
            Err(e) => {
                warn!("returning empty fund data for {user}: {e}");
                FullFundsData::default()
            }
        }
    }

    /// Adds a fund, or renames it when the code is already tracked.
    pub async fn add_fund(&self, user: &UserId, fund: &NewFund) -> CloudResult<Fund> {
        let rows = self
            .backend
            .upsert(Table::Funds, vec![mapper::new_fund_row(user, fund)], FUND_CONFLICT)
            .await
            .inspect_err(|e| warn!("failed to add fund {}: {e}", fund.code))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::NotFound(format!("fund {} not returned", fund.code)))?;
        debug!("added fund {} for {user}", fund.code);
        decode_fund(row)
    }

    /// Applies `patch` to one fund. `Ok(None)` when no such fund exists.
    pub async fn update_fund(
        &self,
        user: &UserId,
        code: &str,
        patch: &FundPatch,
    ) -> CloudResult<Option<Fund>> {
        let filters = key_filters(user, code);

        // Nothing to write; report the current row instead.
        let result = if patch.is_empty() {
            let query = Select::from(Table::Funds)
                .eq("user_id", user.as_str())
                .eq("fund_code", code);
            self.backend.select(&query).await
        } else {
            self.backend
                .update(Table::Funds, &filters, mapper::fund_patch_to_row(patch))
                .await
        };
        let rows = result.inspect_err(|e| warn!("failed to update fund {code}: {e}"))?;

        rows.into_iter().next().map(decode_fund).transpose()
    }

    pub async fn toggle_favorite(
        &self,
        user: &UserId,
        code: &str,
        is_favorite: bool,
    ) -> CloudResult<Option<Fund>> {
        let patch = FundPatch {
            is_favorite: Some(is_favorite),
            ..Default::default()
        };
        self.update_fund(user, code, &patch).await
    }

    pub async fn toggle_collapsed(
        &self,
        user: &UserId,
        code: &str,
        is_collapsed: bool,
    ) -> CloudResult<Option<Fund>> {
        let patch = FundPatch {
            is_collapsed: Some(is_collapsed),
            ..Default::default()
        };
        self.update_fund(user, code, &patch).await
    }

    /// Sets each fund's `sort_order` to its index in `codes`. Writes one row
    /// at a time and stops at the first failure.
    pub async fn update_funds_order<S: AsRef<str>>(&self, user: &UserId, codes: &[S]) -> bool {
        for (index, code) in codes.iter().enumerate() {
            let code = code.as_ref();
            let patch = FundPatch {
                sort_order: Some(index as i64),
                ..Default::default()
            };
            if let Err(e) = self
                .backend
                .update(Table::Funds, &key_filters(user, code), mapper::fund_patch_to_row(&patch))
                .await
            {
                warn!("reorder stopped at {code} (position {index}): {e}");
                return false;
            }
        }
        debug!("reordered {} funds for {user}", codes.len());
        true
    }

    /// Removes a fund. Removing an untracked code succeeds.
    pub async fn delete_fund(&self, user: &UserId, code: &str) -> bool {
        match self.backend.delete(Table::Funds, &key_filters(user, code)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to delete fund {code}: {e}");
                false
            }
        }
    }

    /// Uploads every fund of a local snapshot, one upsert per fund.
    pub async fn sync_funds(&self, user: &UserId, snapshot: &LocalSnapshot) -> bool {
        for (index, fund) in snapshot.funds.iter().enumerate() {
            let row = mapper::local_fund_row(user, fund, index, snapshot);
            if let Err(e) = self.backend.upsert(Table::Funds, vec![row], FUND_CONFLICT).await {
                warn!("fund sync stopped at {}: {e}", fund.code);
                return false;
            }
        }
        info!("synced {} funds for {user}", snapshot.funds.len());
        true
    }
}
