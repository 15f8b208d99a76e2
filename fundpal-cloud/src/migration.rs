//! One-time copy of the local snapshot into the remote store.

use crate::backend::Backend;
use crate::funds::FundService;
use crate::groups::GroupService;
use crate::settings::SettingsService;
use fundpal_storage::{LocalStore, MigrationState, load_local_funds, load_snapshot};
use fundpal_types::{NewGroup, SettingsPatch, UserId};
use std::sync::Arc;
use tracing::{info, warn};

pub struct MigrationService {
    store: Arc<dyn LocalStore>,
    user: UserId,
    funds: FundService,
    groups: GroupService,
    settings: SettingsService,
}

impl MigrationService {
    pub fn new(store: Arc<dyn LocalStore>, backend: Arc<dyn Backend>, user: UserId) -> Self {
        Self {
            store,
            user,
            funds: FundService::new(backend.clone()),
            groups: GroupService::new(backend.clone()),
            settings: SettingsService::new(backend),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Current persisted state. An unreadable store reads as not migrated.
    pub fn state(&self) -> MigrationState {
        MigrationState::load(self.store.as_ref()).unwrap_or_else(|e| {
            warn!("failed to read migration state: {e}");
            MigrationState::NotMigrated
        })
    }

    /// True when migration has not run and there are local funds to copy.
    pub fn check_migration_needed(&self) -> bool {
        let state = match MigrationState::load(self.store.as_ref()) {
            Ok(state) => state,
            Err(e) => {
                warn!("failed to read migration state: {e}");
                return false;
            }
        };
        if state.is_migrated() {
            return false;
        }

        match load_local_funds(self.store.as_ref()) {
            Ok(funds) => !funds.is_empty(),
            Err(e) => {
                warn!("local funds unreadable, skipping migration: {e}");
                false
            }
        }
    }

    /// Copies funds, then groups, then settings. On success the state becomes
    /// `Migrated`; on any failure it stays `NotMigrated` with whatever was
    /// already written left in place.
    pub async fn migrate(&self) -> bool {
        let snapshot = match load_snapshot(self.store.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("migration aborted, local snapshot unreadable: {e}");
                return false;
            }
        };
        info!(
            "migrating {} funds and {} groups for {}",
            snapshot.funds.len(),
            snapshot.groups.len(),
            self.user
        );

        if !self.funds.sync_funds(&self.user, &snapshot).await {
            warn!("migration aborted during fund upload");
            return false;
        }

        let groups: Vec<NewGroup> = snapshot
            .groups
            .iter()
            .map(|g| NewGroup::new(g.id.as_str(), g.name.as_str()))
            .collect();
        if !self.groups.save_groups(&self.user, &groups).await {
            warn!("migration aborted during group upload");
            return false;
        }

        let patch = SettingsPatch {
            refresh_ms: snapshot.refresh_ms,
            view_mode: snapshot.view_mode,
        };
        if !patch.is_empty() {
            if let Err(e) = self.settings.update_settings(&self.user, &patch).await {
                warn!("migration aborted during settings upload: {e}");
                return false;
            }
        }

        if let Err(e) = MigrationState::mark_migrated(self.store.as_ref()) {
            warn!("migration copied but state not persisted: {e}");
            return false;
        }
        info!("migration complete for {}", self.user);
        true
    }

    /// Returns the state to `NotMigrated`.
    pub fn reset(&self) -> bool {
        match MigrationState::reset(self.store.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to reset migration state: {e}");
                false
            }
        }
    }
}
