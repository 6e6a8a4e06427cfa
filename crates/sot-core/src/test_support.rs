//! In-memory collaborators for exercising the policy machine without a browser.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::browser::{CloseOutcome, Delivery, TabActuator, TabId, TabSnapshot, TabSource, WarningPayload};
use crate::store::SessionStore;
use sot_storage::{FocusSession, Settings};

#[derive(Default)]
pub struct MemoryStore {
    session: Mutex<Option<FocusSession>>,
    settings: Mutex<Settings>,
    failing: bool,
}

impl MemoryStore {
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            ..Self::default()
        }
    }

    /// Every operation fails, as a broken disk would
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Option<FocusSession> {
        self.session.lock().unwrap().clone()
    }

    pub fn set_settings(&self, settings: Settings) {
        *self.settings.lock().unwrap() = settings;
    }
}

impl SessionStore for MemoryStore {
    fn save_session(&self, session: &FocusSession) -> Result<()> {
        if self.failing {
            bail!("disk full");
        }
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn load_session(&self) -> Result<Option<FocusSession>> {
        if self.failing {
            bail!("disk unreadable");
        }
        Ok(self.session.lock().unwrap().clone())
    }

    fn clear_session(&self) -> Result<()> {
        if self.failing {
            bail!("disk full");
        }
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    fn settings(&self) -> Result<Settings> {
        if self.failing {
            bail!("disk unreadable");
        }
        Ok(self.settings.lock().unwrap().clone())
    }
}

/// Records every warning attempt and closure
#[derive(Default)]
pub struct MockActuator {
    open_tabs: Mutex<HashSet<TabId>>,
    unreachable: Mutex<HashMap<TabId, u32>>,
    attempts: Mutex<Vec<TabId>>,
    delivered: Mutex<Vec<(TabId, WarningPayload)>>,
    closed: Mutex<Vec<TabId>>,
}

impl MockActuator {
    pub fn with_open_tabs(tabs: &[TabId]) -> Self {
        let actuator = Self::default();
        actuator.open_tabs.lock().unwrap().extend(tabs);
        actuator
    }

    /// The next `attempts` warnings to `tab_id` find nobody listening
    pub fn unreachable_for(&self, tab_id: TabId, attempts: u32) {
        self.unreachable.lock().unwrap().insert(tab_id, attempts);
    }

    pub fn close_externally(&self, tab_id: TabId) {
        self.open_tabs.lock().unwrap().remove(&tab_id);
    }

    pub fn attempts(&self, tab_id: TabId) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|id| **id == tab_id)
            .count()
    }

    pub fn delivered(&self) -> Vec<(TabId, WarningPayload)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<TabId> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TabActuator for MockActuator {
    async fn send_warning(&self, tab_id: TabId, payload: &WarningPayload) -> Result<Delivery> {
        self.attempts.lock().unwrap().push(tab_id);

        let mut unreachable = self.unreachable.lock().unwrap();
        if let Some(remaining) = unreachable.get_mut(&tab_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Delivery::Unreachable);
            }
        }

        self.delivered.lock().unwrap().push((tab_id, payload.clone()));
        Ok(Delivery::Delivered)
    }

    async fn tab_exists(&self, tab_id: TabId) -> Result<bool> {
        Ok(self.open_tabs.lock().unwrap().contains(&tab_id))
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<CloseOutcome> {
        if self.open_tabs.lock().unwrap().remove(&tab_id) {
            self.closed.lock().unwrap().push(tab_id);
            Ok(CloseOutcome::Closed)
        } else {
            Ok(CloseOutcome::AlreadyClosed)
        }
    }
}

/// Fixed list of open tabs
#[derive(Default)]
pub struct MockSource {
    tabs: Mutex<Vec<TabSnapshot>>,
    failing: bool,
}

impl MockSource {
    pub fn new(tabs: Vec<TabSnapshot>) -> Self {
        Self {
            tabs: Mutex::new(tabs),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TabSource for MockSource {
    async fn list_open_tabs(&self) -> Result<Vec<TabSnapshot>> {
        if self.failing {
            bail!("browser disconnected");
        }
        Ok(self.tabs.lock().unwrap().clone())
    }
}
