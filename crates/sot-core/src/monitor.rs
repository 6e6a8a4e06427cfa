use anyhow::{Context, Result};
use std::sync::Arc;

use crate::browser::{TabEvent, TabSource, TabStatus};
use crate::policy::{EvaluationOrigin, PolicyMachine, TabDecision};

/// Tally of one full scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub skipped: usize,
    pub on_topic: usize,
    pub off_topic: usize,
    /// Off-topic tabs that got an auto-close timer
    pub scheduled: usize,
}

impl ScanReport {
    fn record(&mut self, decision: TabDecision) {
        self.scanned += 1;
        match decision {
            TabDecision::NoSession | TabDecision::Skipped(_) => self.skipped += 1,
            TabDecision::OnTopic { .. } => self.on_topic += 1,
            TabDecision::OffTopic { closure_in, .. } => {
                self.off_topic += 1;
                if closure_in.is_some() {
                    self.scheduled += 1;
                }
            }
        }
    }
}

/// Feeds tabs from the browser into the policy machine
pub struct TabMonitor {
    source: Arc<dyn TabSource>,
    policy: PolicyMachine,
}

impl TabMonitor {
    #[must_use]
    pub fn new(source: Arc<dyn TabSource>, policy: PolicyMachine) -> Self {
        Self { source, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &PolicyMachine {
        &self.policy
    }

    /// Evaluate every open tab against the active session
    ///
    /// # Errors
    ///
    /// Returns an error if the open tabs cannot be listed
    pub async fn scan_all(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        if self.policy.current_session().await.is_none() {
            return Ok(report);
        }

        let tabs = self
            .source
            .list_open_tabs()
            .await
            .context("Failed to list open tabs")?;

        for tab in &tabs {
            let decision = self.policy.evaluate_tab(tab, EvaluationOrigin::FullScan).await;
            report.record(decision);
        }

        log::debug!(
            "Scanned {} tabs: {} on topic, {} off topic, {} skipped",
            report.scanned,
            report.on_topic,
            report.off_topic,
            report.skipped
        );
        Ok(report)
    }

    /// React to a tab update; only finished page loads are evaluated
    pub async fn handle_event(&self, event: &TabEvent) -> Option<TabDecision> {
        if event.status != TabStatus::Complete {
            return None;
        }
        Some(
            self.policy
                .evaluate_tab(&event.tab, EvaluationOrigin::LiveUpdate)
                .await,
        )
    }
}
