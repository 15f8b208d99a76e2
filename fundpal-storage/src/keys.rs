//! Keys of the local store. Values are JSON-encoded except
//! [`USER_ID`] and [`MIGRATED`], which hold plain strings.

pub const USER_ID: &str = "fund_user_id";
pub const FUNDS: &str = "funds";
pub const FAVORITES: &str = "favorites";
pub const COLLAPSED_CODES: &str = "collapsedCodes";
pub const HOLDINGS: &str = "holdings";
pub const GROUPS: &str = "groups";
pub const REFRESH_MS: &str = "refreshMs";
pub const VIEW_MODE: &str = "viewMode";
pub const MIGRATED: &str = "supabase_migrated";
