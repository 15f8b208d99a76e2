//! Reading the pre-migration snapshot out of the local store.

use crate::error::StorageResult;
use crate::keys;
use crate::store::{LocalStore, LocalStoreExt};
use fundpal_types::numeric::parse_lenient;
use fundpal_types::{LocalFund, LocalSnapshot, ViewMode};

/// The local `funds` list, empty when the key is absent.
pub fn load_local_funds(store: &dyn LocalStore) -> StorageResult<Vec<LocalFund>> {
    Ok(store.get_json(keys::FUNDS)?.unwrap_or_default())
}

/// Reads every snapshot key. Missing keys take their empty value; a key that
/// holds malformed JSON fails the whole load.
pub fn load_snapshot(store: &dyn LocalStore) -> StorageResult<LocalSnapshot> {
    let refresh_ms = store
        .get_json::<serde_json::Value>(keys::REFRESH_MS)?
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => Some(parse_lenient(&s)),
            _ => None,
        })
        .filter(|ms| *ms > 0.0)
        .map(|ms| ms as u64);

    // Some builds wrote the bare word instead of a JSON string.
    let view_mode = store
        .get(keys::VIEW_MODE)?
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| serde_json::from_str::<String>(&raw).unwrap_or(raw))
        .map(|mode| ViewMode::parse(&mode));

    Ok(LocalSnapshot {
        funds: load_local_funds(store)?,
        favorites: store.get_json(keys::FAVORITES)?.unwrap_or_default(),
        collapsed_codes: store.get_json(keys::COLLAPSED_CODES)?.unwrap_or_default(),
        holdings: store.get_json(keys::HOLDINGS)?.unwrap_or_default(),
        groups: store.get_json(keys::GROUPS)?.unwrap_or_default(),
        refresh_ms,
        view_mode,
    })
}
