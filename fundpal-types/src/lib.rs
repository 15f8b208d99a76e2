//! Shared types for fundpal.
//!
//! Two families of shapes live here:
//! - UI shapes (`Fund`, `Group`, `Settings`) serialise camelCase and are what
//!   callers of the services see.
//! - Storage rows (`FundRow`, `GroupRow`, `SettingsRow`) mirror the snake_case
//!   columns of the remote tables.
//!
//! Translation between the two is the job of the record mapper in
//! `fundpal-cloud`.

pub mod fund;
pub mod group;
pub mod ids;
pub mod numeric;
pub mod settings;
pub mod snapshot;

pub use fund::{FullFundsData, Fund, FundPatch, FundRow, Holding, NewFund};
pub use group::{Group, GroupRow, NewGroup};
pub use ids::UserId;
pub use settings::{Settings, SettingsPatch, SettingsRow, ViewMode, DEFAULT_REFRESH_MS};
pub use snapshot::{LocalFund, LocalGroup, LocalSnapshot};
