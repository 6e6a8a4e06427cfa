use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sot_storage::Strictness;

pub mod native;

/// Browser-assigned tab identifier
pub type TabId = i64;

/// Title and URL of one tab at the moment it is evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

impl TabSnapshot {
    #[must_use]
    pub fn new(id: TabId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Loading state reported with a tab update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
    #[serde(other)]
    Unknown,
}

/// A tab lifecycle transition pushed by the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabEvent {
    pub tab: TabSnapshot,
    pub status: TabStatus,
}

/// What an off-topic tab is told
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningPayload {
    pub goal: String,
    pub strictness: Strictness,
    #[serde(rename = "similarity")]
    pub score: f64,
    pub threshold: f64,
}

/// Result of handing a warning to a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Nothing in the tab is listening yet (page still loading, restricted page)
    Unreachable,
}

/// Result of asking the browser to close a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
}

/// Source of open tabs for full scans
#[async_trait]
pub trait TabSource: Send + Sync {
    /// Snapshot every open tab
    async fn list_open_tabs(&self) -> Result<Vec<TabSnapshot>>;
}

/// Actions the policy takes on tabs
#[async_trait]
pub trait TabActuator: Send + Sync {
    /// Show the off-topic warning inside a tab
    async fn send_warning(&self, tab_id: TabId, payload: &WarningPayload) -> Result<Delivery>;

    /// Check whether a tab is still open
    async fn tab_exists(&self, tab_id: TabId) -> Result<bool>;

    /// Close a tab; a tab that is already gone is not an error
    async fn close_tab(&self, tab_id: TabId) -> Result<CloseOutcome>;
}
