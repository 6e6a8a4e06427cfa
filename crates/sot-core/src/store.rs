use anyhow::Result;
use sot_storage::{Database, FocusSession, Settings};

/// Persistence the policy machine needs: the active session and the user's settings
pub trait SessionStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the write fails
    fn save_session(&self, session: &FocusSession) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the read fails
    fn load_session(&self) -> Result<Option<FocusSession>>;

    /// # Errors
    ///
    /// Returns an error if the delete fails
    fn clear_session(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the read fails
    fn settings(&self) -> Result<Settings>;
}

impl SessionStore for Database {
    fn save_session(&self, session: &FocusSession) -> Result<()> {
        Database::save_session(self, session)
    }

    fn load_session(&self) -> Result<Option<FocusSession>> {
        Database::load_session(self)
    }

    fn clear_session(&self) -> Result<()> {
        Database::clear_session(self)
    }

    fn settings(&self) -> Result<Settings> {
        self.get_settings()
    }
}
