use std::collections::HashMap;
use tokio::task::JoinHandle;

use crate::browser::TabId;
use sot_storage::FocusSession;

/// A scheduled auto-close for one tab
#[derive(Debug)]
pub(crate) struct PendingClosure {
    ticket: u64,
    handle: JoinHandle<()>,
}

/// Everything the policy machine mutates, behind one lock.
///
/// At most one pending closure exists per tab. Entries are only added by
/// [`PolicyState::replace_closure`] and only removed by cancellation or by the
/// timer that owns the ticket.
#[derive(Debug, Default)]
pub struct PolicyState {
    pub(crate) active_session: Option<FocusSession>,
    pending_closures: HashMap<TabId, PendingClosure>,
    next_ticket: u64,
}

impl PolicyState {
    pub(crate) fn issue_ticket(&mut self) -> u64 {
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.next_ticket
    }

    /// Install a timer for a tab, aborting the one it replaces.
    /// Returns true if an older timer was replaced.
    pub(crate) fn replace_closure(
        &mut self,
        tab_id: TabId,
        ticket: u64,
        handle: JoinHandle<()>,
    ) -> bool {
        match self
            .pending_closures
            .insert(tab_id, PendingClosure { ticket, handle })
        {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort and forget the timer for a tab
    pub(crate) fn cancel_closure(&mut self, tab_id: TabId) -> bool {
        match self.pending_closures.remove(&tab_id) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Claim the entry for a firing timer. Fails if the timer was cancelled or
    /// replaced while it slept.
    pub(crate) fn take_if_ticket(&mut self, tab_id: TabId, ticket: u64) -> bool {
        if self
            .pending_closures
            .get(&tab_id)
            .is_some_and(|pending| pending.ticket == ticket)
        {
            // The caller is the timer task itself, so the handle is dropped, not aborted
            self.pending_closures.remove(&tab_id);
            true
        } else {
            false
        }
    }

    /// Abort every timer, returning how many were pending
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.pending_closures.len();
        for (_, pending) in self.pending_closures.drain() {
            pending.handle.abort();
        }
        count
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending_closures.len()
    }

    #[must_use]
    pub fn has_pending(&self, tab_id: TabId) -> bool {
        self.pending_closures.contains_key(&tab_id)
    }

    /// Tab ids with a pending closure, ascending
    #[must_use]
    pub fn pending_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self.pending_closures.keys().copied().collect();
        tabs.sort_unstable();
        tabs
    }
}
