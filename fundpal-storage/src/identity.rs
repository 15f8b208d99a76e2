//! Resolution of the current user's identifier.

use crate::keys;
use crate::store::LocalStore;
use fundpal_types::UserId;
use rand::Rng;
use tracing::{debug, warn};

/// Identity used by single-user installs.
pub const DEFAULT_USER_ID: &str = "default_user";

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// How the user id is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResolver {
    /// A constant identity shared by every install.
    Fixed(UserId),
    /// A per-install identity generated on first use and cached under
    /// [`keys::USER_ID`].
    Device,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        IdentityResolver::Fixed(UserId::new(DEFAULT_USER_ID))
    }
}

impl IdentityResolver {
    /// Returns the user id. Never fails: storage errors are logged and a
    /// freshly generated id is returned instead.
    pub fn resolve(&self, store: &dyn LocalStore) -> UserId {
        match self {
            IdentityResolver::Fixed(id) => id.clone(),
            IdentityResolver::Device => resolve_device(store),
        }
    }
}

fn resolve_device(store: &dyn LocalStore) -> UserId {
    match store.get(keys::USER_ID) {
        Ok(Some(existing)) if !existing.trim().is_empty() => return UserId::new(existing),
        Ok(_) => {}
        Err(e) => warn!("failed to read cached user id: {e}"),
    }

    let id = generate_device_id();
    if let Err(e) = store.set(keys::USER_ID, id.as_str()) {
        warn!("failed to cache generated user id: {e}");
    } else {
        debug!("generated device user id {id}");
    }
    id
}

/// `user_<unix millis>_<9 base36 chars>`.
pub fn generate_device_id() -> UserId {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    UserId::new(format!(
        "user_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        suffix
    ))
}
