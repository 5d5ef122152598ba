//! Durable client-state keys. Each key holds one independent value.

pub const ACCESS_TOKEN: &str = "access_token";
pub const LANGUAGE: &str = "language";
pub const ACCESSIBILITY: &str = "accessibilityPreferences";
pub const TYPOGRAPHY: &str = "typography_settings";
pub const DARK_MODE: &str = "darkModePreference";

/// Key under which a category's unsynced progress backup is kept.
#[must_use]
pub fn progress_backup(category_id: u64) -> String {
    format!("progress_backup_category_{category_id}")
}
