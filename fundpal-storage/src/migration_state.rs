//! Persisted one-way marker for the local-to-remote copy.

use crate::error::StorageResult;
use crate::keys;
use crate::store::LocalStore;

const MIGRATED_VALUE: &str = "true";

/// Whether the local snapshot has been copied to the remote store.
///
/// `Migrated` is terminal; only [`MigrationState::reset`] moves back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    NotMigrated,
    Migrated,
}

impl MigrationState {
    pub fn load(store: &dyn LocalStore) -> StorageResult<Self> {
        let state = match store.get(keys::MIGRATED)? {
            Some(value) if value.trim() == MIGRATED_VALUE => MigrationState::Migrated,
            _ => MigrationState::NotMigrated,
        };
        Ok(state)
    }

    pub fn mark_migrated(store: &dyn LocalStore) -> StorageResult<()> {
        store.set(keys::MIGRATED, MIGRATED_VALUE)
    }

    /// Clears the marker. Intended for tests and manual re-runs.
    pub fn reset(store: &dyn LocalStore) -> StorageResult<()> {
        store.remove(keys::MIGRATED)
    }

    pub fn is_migrated(&self) -> bool {
        matches!(self, MigrationState::Migrated)
    }
}
