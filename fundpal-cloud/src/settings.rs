//! Per-user settings over the `user_settings` table.

use crate::backend::Backend;
use crate::error::{CloudError, CloudResult};
use crate::mapper;
use crate::query::{Select, Table};
use fundpal_types::{Settings, SettingsPatch, SettingsRow, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SETTINGS_CONFLICT: &[&str] = &["user_id"];

#[derive(Clone)]
pub struct SettingsService {
    backend: Arc<dyn Backend>,
}

impl SettingsService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Settings of `user`, creating the default row on first read.
    ///
    /// Never fails: any error other than a missing row falls back to
    /// [`Settings::default`].
    pub async fn get_settings(&self, user: &UserId) -> Settings {
        let query = Select::from(Table::UserSettings).eq("user_id", user.as_str());

        match self.backend.select_single(&query).await {
            Ok(row) => match mapper::decode_row::<SettingsRow>(row) {
                Ok(row) => mapper::settings_from_row(row),
                Err(e) => {
                    warn!("unreadable settings row for {user}: {e}");
                    Settings::default()
                }
            },
            Err(CloudError::NotFound(_)) => {
                info!("no settings for {user}, creating defaults");
                if let Err(e) = self
                    .backend
                    .insert(Table::UserSettings, vec![mapper::default_settings_row(user)])
                    .await
                {
                    warn!("failed to create default settings for {user}: {e}");
                }
                Settings::default()
            }
            Err(e) => {
                warn!("failed to load settings for {user}: {e}");
                Settings::default()
            }
        }
    }

    /// Writes the fields present in `patch`, creating the row if needed.
    pub async fn update_settings(&self, user: &UserId, patch: &SettingsPatch) -> CloudResult<Settings> {
        let rows = self
            .backend
            .upsert(
                Table::UserSettings,
                vec![mapper::settings_patch_to_row(user, patch)],
                SETTINGS_CONFLICT,
            )
            .await
            .inspect_err(|e| warn!("failed to update settings for {user}: {e}"))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::NotFound(format!("settings for {user} not returned")))?;
        debug!("updated settings for {user}");
        Ok(mapper::settings_from_row(mapper::decode_row(row)?))
    }
}
