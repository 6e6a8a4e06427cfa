use anyhow::Result;

use super::Database;
use crate::models::FocusSession;

/// Key the active focus session is stored under
pub const SESSION_KEY: &str = "focusSession";

impl Database {
    /// Persist the active focus session, replacing any saved one
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn save_session(&self, session: &FocusSession) -> Result<()> {
        self.set(SESSION_KEY, session)?;
        log::debug!("Saved focus session {}", session.id);
        Ok(())
    }

    /// Load the saved focus session, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record is corrupt
    pub fn load_session(&self) -> Result<Option<FocusSession>> {
        self.get(SESSION_KEY)
    }

    /// Drop the saved focus session
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn clear_session(&self) -> Result<()> {
        self.remove(&[SESSION_KEY])
    }
}

#[cfg(test)]
mod tests {
    use crate::models::Strictness;
    use crate::Database;
    use crate::FocusSession;

    #[test]
    fn test_session_roundtrip() {
        let db = Database::in_memory().unwrap();
        assert!(db.load_session().unwrap().is_none());

        let session = FocusSession::start("write the report", Strictness::Hard, 0.25).unwrap();
        db.save_session(&session).unwrap();
        assert_eq!(db.load_session().unwrap(), Some(session));
    }

    #[test]
    fn test_save_replaces_previous_session() {
        let db = Database::in_memory().unwrap();
        let first = FocusSession::start("first goal", Strictness::Soft, 0.3).unwrap();
        let second = FocusSession::start("second goal", Strictness::Hard, 0.5).unwrap();

        db.save_session(&first).unwrap();
        db.save_session(&second).unwrap();

        assert_eq!(db.load_session().unwrap(), Some(second));
    }

    #[test]
    fn test_clear_session() {
        let db = Database::in_memory().unwrap();
        let session = FocusSession::start("rust", Strictness::Soft, 0.3).unwrap();
        db.save_session(&session).unwrap();

        db.clear_session().unwrap();
        assert!(db.load_session().unwrap().is_none());

        // Clearing twice is harmless
        db.clear_session().unwrap();
    }

    #[test]
    fn test_corrupt_session_is_an_error() {
        let db = Database::in_memory().unwrap();
        db.set(super::SESSION_KEY, "garbage").unwrap();
        assert!(db.load_session().is_err());
    }
}
