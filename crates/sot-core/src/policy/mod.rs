//! Session policy: owns the active focus session and the per-tab closure timers.
//!
//! Every mutation goes through one [`tokio::sync::Mutex`] around [`PolicyState`].
//! Actuator calls are made after the lock is released.

mod state;


pub use state::PolicyState;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::browser::{CloseOutcome, Delivery, TabActuator, TabId, TabSnapshot, WarningPayload};
use crate::config::PolicyTiming;
use crate::ignore::{is_internal_page, IgnoreRules};
use crate::store::SessionStore;
use anyhow::Result;
use sot_relevance::is_on_topic;
use sot_storage::{FocusSession, SessionError, Settings, Strictness};

/// How a tab came up for evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOrigin {
    /// Periodic or session-start sweep over every open tab
    FullScan,
    /// The user just finished loading the page
    LiveUpdate,
}

/// Why a tab was not scored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Title or URL not known yet
    MissingInfo,
    InternalPage,
    IgnoredPlatform,
}

/// Outcome of evaluating one tab
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TabDecision {
    NoSession,
    Skipped(SkipReason),
    OnTopic { score: f64 },
    /// Warned; `closure_in` is set when an auto-close was scheduled
    OffTopic {
        score: f64,
        closure_in: Option<Duration>,
    },
}

/// Session state machine and closure scheduler
#[derive(Clone)]
pub struct PolicyMachine {
    state: Arc<Mutex<PolicyState>>,
    actuator: Arc<dyn TabActuator>,
    store: Arc<dyn SessionStore>,
    ignore: Arc<dyn IgnoreRules>,
    timing: PolicyTiming,
}

impl PolicyMachine {
    #[must_use]
    pub fn new(
        actuator: Arc<dyn TabActuator>,
        store: Arc<dyn SessionStore>,
        ignore: Arc<dyn IgnoreRules>,
        timing: PolicyTiming,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(PolicyState::default())),
            actuator,
            store,
            ignore,
            timing,
        }
    }

    /// Current settings, or defaults when the store cannot be read
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.store.settings().unwrap_or_else(|e| {
            log::warn!("Failed to read settings, using defaults: {e:#}");
            Settings::default()
        })
    }

    // ==================== Session Lifecycle ====================

    /// Start a session, replacing any active one.
    ///
    /// Missing strictness or threshold fall back to the stored defaults. The
    /// previous session's pending closures are cancelled. A failed save is
    /// logged and the in-memory session still takes effect.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the goal or threshold is invalid; the
    /// current session is left untouched
    pub async fn start_session(
        &self,
        goal: &str,
        strictness: Option<Strictness>,
        threshold: Option<f64>,
    ) -> Result<FocusSession, SessionError> {
        let settings = self.settings();
        let session = FocusSession::start(
            goal,
            strictness.unwrap_or(settings.default_strictness),
            threshold.unwrap_or(settings.default_threshold),
        )?;

        let mut state = self.state.lock().await;
        let cancelled = state.cancel_all();
        state.active_session = Some(session.clone());
        if let Err(e) = self.store.save_session(&session) {
            log::warn!("Failed to persist focus session: {e:#}");
        }
        drop(state);

        if cancelled > 0 {
            log::info!("Cancelled {cancelled} pending closures from the previous session");
        }
        log::info!(
            "Focus session started: \"{}\" ({}, threshold {})",
            session.goal,
            session.strictness,
            session.threshold
        );
        Ok(session)
    }

    /// End the active session and cancel every pending closure.
    /// Returns the session that was ended.
    pub async fn end_session(&self) -> Option<FocusSession> {
        let mut state = self.state.lock().await;
        self.end_locked(&mut state)
    }

    /// Clear the session, its timers and the saved copy. The caller holds the lock.
    fn end_locked(&self, state: &mut PolicyState) -> Option<FocusSession> {
        let ended = state.active_session.take();
        let cancelled = state.cancel_all();

        if let Err(e) = self.store.clear_session() {
            log::warn!("Failed to clear saved focus session: {e:#}");
        }

        match &ended {
            Some(session) => log::info!(
                "Focus session ended: \"{}\" ({cancelled} pending closures cancelled)",
                session.goal
            ),
            None => log::debug!("End requested with no active session"),
        }
        ended
    }

    pub async fn current_session(&self) -> Option<FocusSession> {
        self.state.lock().await.active_session.clone()
    }

    /// Adopt the saved session from a previous run, unless it has expired.
    ///
    /// A session already active in memory wins over the saved one.
    pub async fn restore_session(&self, now: DateTime<Utc>) -> Option<FocusSession> {
        let saved = match self.store.load_session() {
            Ok(saved) => saved?,
            Err(e) => {
                log::warn!("Failed to load saved focus session: {e:#}");
                return None;
            }
        };

        let timeout = self.settings().session_timeout;
        if saved.is_expired(timeout, now) {
            log::info!(
                "Saved session \"{}\" expired after {timeout} minutes, discarding",
                saved.goal
            );
            if let Err(e) = self.store.clear_session() {
                log::warn!("Failed to clear expired session: {e:#}");
            }
            return None;
        }

        let mut state = self.state.lock().await;
        if state.active_session.is_some() {
            return None;
        }
        state.active_session = Some(saved.clone());
        drop(state);

        log::info!(
            "Restored focus session \"{}\" started {}",
            saved.goal,
            saved.describe_elapsed(now)
        );
        Some(saved)
    }

    /// End the session if it has outlived the configured timeout.
    ///
    /// The check and the end happen under one lock, so a session started in
    /// the meantime is never ended in place of the expired one.
    pub async fn expire_if_due(&self, now: DateTime<Utc>) -> Option<FocusSession> {
        let timeout = self.settings().session_timeout;
        let mut state = self.state.lock().await;
        let due = state
            .active_session
            .as_ref()
            .is_some_and(|session| session.is_expired(timeout, now));
        if !due {
            return None;
        }

        log::info!("Focus session reached its {timeout} minute limit");
        self.end_locked(&mut state)
    }

    /// Cancel all timers before the host exits. The saved session is kept.
    pub async fn shutdown(&self) {
        let cancelled = self.state.lock().await.cancel_all();
        if cancelled > 0 {
            log::info!("Dropped {cancelled} pending closures on shutdown");
        }
    }

    // ==================== Tab Evaluation ====================

    /// Score a tab against the active session and act on the verdict
    pub async fn evaluate_tab(&self, tab: &TabSnapshot, origin: EvaluationOrigin) -> TabDecision {
        let Some(session) = self.current_session().await else {
            return TabDecision::NoSession;
        };

        if tab.title.is_empty() || tab.url.is_empty() {
            return TabDecision::Skipped(SkipReason::MissingInfo);
        }
        if is_internal_page(&tab.url) {
            return TabDecision::Skipped(SkipReason::InternalPage);
        }
        if self.ignore.should_ignore(&tab.url) {
            log::debug!("Ignoring platform tab {}: {}", tab.id, tab.url);
            return TabDecision::Skipped(SkipReason::IgnoredPlatform);
        }

        let verdict = is_on_topic(&session.goal, &tab.title, &tab.url, session.threshold);
        if verdict.on_topic {
            log::debug!("Tab {} on topic ({:.3})", tab.id, verdict.score);
            return TabDecision::OnTopic {
                score: verdict.score,
            };
        }

        log::info!(
            "Tab {} off topic ({:.3} < {}): {}",
            tab.id,
            verdict.score,
            session.threshold,
            tab.title
        );

        let payload = WarningPayload {
            goal: session.goal.clone(),
            strictness: session.strictness,
            score: verdict.score,
            threshold: session.threshold,
        };
        tokio::spawn(self.clone().deliver_warning(tab.id, session.id, payload));

        let closure_in = if session.strictness.closes_tabs() {
            let delay = self.closure_delay(origin);
            self.schedule_closure(tab.id, session.id, delay)
                .await
                .then_some(delay)
        } else {
            None
        };

        TabDecision::OffTopic {
            score: verdict.score,
            closure_in,
        }
    }

    fn closure_delay(&self, origin: EvaluationOrigin) -> Duration {
        match origin {
            EvaluationOrigin::FullScan => self.timing.scan_closure_delay,
            EvaluationOrigin::LiveUpdate => self.timing.live_closure_delay,
        }
    }

    async fn is_current(&self, session_id: Uuid) -> bool {
        self.state
            .lock()
            .await
            .active_session
            .as_ref()
            .is_some_and(|session| session.id == session_id)
    }

    /// Send the warning, retrying per the bounded policy. Never fails.
    async fn deliver_warning(self, tab_id: TabId, session_id: Uuid, payload: WarningPayload) {
        let retry = self.timing.warning_retry;

        for attempt in 1..=retry.attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(retry.backoff).await;
            }
            if !self.is_current(session_id).await {
                log::debug!("Session changed, dropping warning for tab {tab_id}");
                return;
            }

            match self.actuator.send_warning(tab_id, &payload).await {
                Ok(Delivery::Delivered) => {
                    log::debug!("Warning delivered to tab {tab_id}");
                    return;
                }
                Ok(Delivery::Unreachable) => {
                    log::debug!("Tab {tab_id} not ready for warning (attempt {attempt})");
                }
                Err(e) => {
                    log::warn!("Warning to tab {tab_id} failed (attempt {attempt}): {e:#}");
                }
            }
        }

        log::info!("Could not warn tab {tab_id}, giving up");
    }

    // ==================== Closure Timers ====================

    /// Arm the auto-close timer for a tab, replacing any pending one.
    /// Returns false if the session changed since the tab was evaluated.
    async fn schedule_closure(&self, tab_id: TabId, session_id: Uuid, delay: Duration) -> bool {
        let mut state = self.state.lock().await;
        if state.active_session.as_ref().map(|s| s.id) != Some(session_id) {
            return false;
        }

        let ticket = state.issue_ticket();
        let handle = tokio::spawn(self.clone().fire_closure(tab_id, ticket, delay));
        if state.replace_closure(tab_id, ticket, handle) {
            log::debug!("Replaced pending closure for tab {tab_id}");
        }

        log::info!("Tab {tab_id} will close in {}s", delay.as_secs());
        true
    }

    async fn fire_closure(self, tab_id: TabId, ticket: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let claimed = self.state.lock().await.take_if_ticket(tab_id, ticket);
        if !claimed {
            return;
        }

        match self.actuator.tab_exists(tab_id).await {
            Ok(true) => match self.actuator.close_tab(tab_id).await {
                Ok(CloseOutcome::Closed) => log::info!("Closed off-topic tab {tab_id}"),
                Ok(CloseOutcome::AlreadyClosed) => {
                    log::debug!("Tab {tab_id} closed before the timer fired");
                }
                Err(e) => log::warn!("Failed to close tab {tab_id}: {e:#}"),
            },
            Ok(false) => log::debug!("Tab {tab_id} no longer exists, nothing to close"),
            Err(e) => log::warn!("Could not check tab {tab_id} before closing: {e:#}"),
        }
    }

    /// Cancel the pending closure for a tab ("continue anyway").
    /// Returns false when there was nothing left to cancel.
    pub async fn cancel_closure(&self, tab_id: TabId) -> bool {
        let cancelled = self.state.lock().await.cancel_closure(tab_id);
        if cancelled {
            log::info!("Closure cancelled for tab {tab_id}");
        } else {
            log::debug!("No pending closure for tab {tab_id}");
        }
        cancelled
    }

    /// Close a tab on the user's request, dropping any timer for it first
    ///
    /// # Errors
    ///
    /// Returns an error if the browser could not be asked to close the tab
    pub async fn close_tab(&self, tab_id: TabId) -> Result<CloseOutcome> {
        self.state.lock().await.cancel_closure(tab_id);
        let outcome = self.actuator.close_tab(tab_id).await?;
        log::info!("Close requested for tab {tab_id}: {outcome:?}");
        Ok(outcome)
    }

    /// Tabs with a pending closure, ascending
    pub async fn pending_closures(&self) -> Vec<TabId> {
        self.state.lock().await.pending_tabs()
    }

    pub async fn has_pending_closure(&self, tab_id: TabId) -> bool {
        self.state.lock().await.has_pending(tab_id)
    }
}
