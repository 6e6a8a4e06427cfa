use anyhow::Result;
use serde_json::Value;

use super::Database;
use crate::models::Settings;

impl Database {
    /// Load settings; keys that were never saved (or fail to decode) fall back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails
    pub fn get_settings(&self) -> Result<Settings> {
        let mut settings = Settings::default_settings();

        for key in Settings::KEYS {
            let Some(value) = self.get::<Value>(key)? else {
                continue;
            };
            // Stored values are JSON scalars; strings are applied without their quotes
            let raw = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if let Err(e) = settings.apply(key, &raw) {
                log::warn!("Ignoring stored setting {key}={raw}: {e}");
            }
        }

        Ok(settings)
    }

    /// Persist every setting as its own key
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails
    pub fn update_settings(&self, settings: &Settings) -> Result<()> {
        self.set(Settings::KEY_DEFAULT_STRICTNESS, &settings.default_strictness)?;
        self.set(Settings::KEY_DEFAULT_THRESHOLD, &settings.default_threshold)?;
        self.set(Settings::KEY_SESSION_TIMEOUT, &settings.session_timeout)?;
        self.set(Settings::KEY_IGNORE_PLATFORMS, &settings.ignore_platforms)?;
        Ok(())
    }

    /// Validate and store a single setting given as user text
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value is invalid, or the write fails
    pub fn set_setting(&self, key: &str, value: &str) -> Result<Settings> {
        let mut settings = self.get_settings()?;
        settings.apply(key, value)?;
        self.update_settings(&settings)?;
        Ok(settings)
    }

    /// Remove stored settings so defaults apply again
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn reset_settings(&self) -> Result<()> {
        self.remove(&Settings::KEYS)
    }
}
