//! Local durable storage for fundpal.
//!
//! Provides the device-local side of the sync contract:
//! - A string key/value store (`LocalStore`) with in-memory and SQLite backends
//! - Well-known keys used by the UI before the remote store took over
//! - The identity resolver that yields the current `UserId`
//! - The persisted one-way `MigrationState`
//! - Loading the pre-migration `LocalSnapshot`

mod error;
pub mod identity;
pub mod keys;
pub mod migration_state;
pub mod snapshot;
mod sqlite;
mod store;

pub use error::{StorageError, StorageResult};
pub use identity::{DEFAULT_USER_ID, IdentityResolver};
pub use migration_state::MigrationState;
pub use snapshot::{load_local_funds, load_snapshot};
pub use sqlite::SqliteStore;
pub use store::{LocalStore, LocalStoreExt, MemoryStore};

/// Default on-disk location of the local store
/// (`<data_local_dir>/fundpal/local.db`).
pub fn default_store_path() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("fundpal").join("local.db"))
}
