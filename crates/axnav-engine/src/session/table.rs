//! Which session is active on which context.
//!
//! The store keeps the durable copy; the table tracks the live side: the
//! cancel token of each active session and whether a task is driving it.

use super::{Session, SessionError, SessionStatus, SessionStore, StoreError};
use crate::supervisor::cancel::{CancelReason, CancelToken};
use axnav_common::protocol::ContextId;
use std::collections::HashMap;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

/// What to do when a context already has a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPolicy {
    /// Refuse the new session.
    #[default]
    Reject,
    /// Cancel the old session and let the new one take over.
    Supersede,
}

struct Entry {
    session_id: String,
    status: SessionStatus,
    cancel: CancelToken,
    /// True while a task is driving the session.
    running: watch::Sender<bool>,
}

impl Entry {
    fn new(session: &Session, running: bool) -> Self {
        let (tx, _) = watch::channel(running);
        Self {
            session_id: session.id.clone(),
            status: session.status,
            cancel: CancelToken::new(),
            running: tx,
        }
    }
}

/// A context claimed by `SessionTable::begin`.
#[derive(Debug)]
pub struct Claim {
    pub cancel: CancelToken,
    /// Driving state of the session this one displaced, if its task was
    /// still running at the time.
    displaced: Option<watch::Receiver<bool>>,
}

impl Claim {
    /// Wait until the task of the displaced session has stopped.
    pub async fn displaced_stopped(&mut self) {
        if let Some(running) = self.displaced.as_mut() {
            let _ = running.wait_for(|busy| !*busy).await;
        }
    }
}

pub struct SessionTable {
    entries: RwLock<HashMap<ContextId, Entry>>,
    /// Running flags of superseded sessions whose task has not released yet,
    /// by session id.
    retiring: RwLock<HashMap<String, watch::Sender<bool>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retiring: RwLock::new(HashMap::new()),
        }
    }

    /// Make `session` the active session of its context and mark it running.
    pub async fn begin(&self, session: &Session, policy: StartPolicy) -> Result<Claim, SessionError> {
        let mut entries = self.entries.write().await;
        let mut superseded = false;

        if let Some(existing) = entries.get(&session.context)
            && !existing.status.is_terminal()
        {
            match policy {
                StartPolicy::Reject => {
                    return Err(SessionError::SessionActive {
                        context: session.context.clone(),
                        status: existing.status,
                    });
                }
                StartPolicy::Supersede => {
                    info!(
                        "Session {} on {} superseded by {}",
                        existing.session_id, session.context, session.id
                    );
                    existing.cancel.cancel(CancelReason::Superseded);
                    superseded = true;
                }
            }
        }

        let entry = Entry::new(session, true);
        let cancel = entry.cancel.clone();
        let previous = entries.insert(session.context.clone(), entry);

        // Keep the old running flag alive until its task releases it.
        let displaced = match previous {
            Some(old) if superseded && *old.running.borrow() => {
                let receiver = old.running.subscribe();
                self.retiring.write().await.insert(old.session_id, old.running);
                Some(receiver)
            }
            _ => None,
        };
        Ok(Claim { cancel, displaced })
    }

    /// Track a session loaded from the store without claiming it.
    /// Existing entries win.
    pub async fn restore(&self, session: &Session) {
        let mut entries = self.entries.write().await;
        entries
            .entry(session.context.clone())
            .or_insert_with(|| Entry::new(session, false));
    }

    /// Claim an already tracked (or stored) session to continue driving it.
    pub async fn adopt(&self, session: &Session) -> Result<CancelToken, SessionError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&session.context) {
            Some(entry) if entry.session_id == session.id => {
                if *entry.running.borrow() {
                    return Err(SessionError::SessionActive {
                        context: session.context.clone(),
                        status: entry.status,
                    });
                }
                entry.running.send_replace(true);
                Ok(entry.cancel.clone())
            }
            _ => {
                let entry = Entry::new(session, true);
                let token = entry.cancel.clone();
                entries.insert(session.context.clone(), entry);
                Ok(token)
            }
        }
    }

    pub async fn is_current(&self, context: &ContextId, session_id: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(context)
            .is_none_or(|e| e.session_id == session_id)
    }

    /// Save `session` unless another session has taken over its context.
    /// Returns whether it was written.
    pub async fn persist(&self, session: &Session, store: &dyn SessionStore) -> Result<bool, StoreError> {
        // Held across the save so a takeover cannot interleave with it.
        let mut entries = self.entries.write().await;
        match entries.get_mut(&session.context) {
            Some(entry) if entry.session_id != session.id => {
                debug!(
                    "Not persisting session {}: context {} now belongs to {}",
                    session.id, session.context, entry.session_id
                );
                return Ok(false);
            }
            Some(entry) => entry.status = session.status,
            None => {}
        }
        store.save(session).await?;
        Ok(true)
    }

    /// The driving task has stopped (paused for an answer, or finished).
    pub async fn release(&self, context: &ContextId, session_id: &str) {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(context)
                && entry.session_id == session_id
            {
                entry.running.send_replace(false);
                return;
            }
        }
        if let Some(running) = self.retiring.write().await.remove(session_id) {
            debug!("Superseded session {} released {}", session_id, context);
            running.send_replace(false);
        }
    }

    /// Signal the active session of `context`. Returns a receiver that
    /// reports whether a task is still driving it, or `None` if nothing is
    /// tracked.
    pub async fn cancel(&self, context: &ContextId, reason: CancelReason) -> Option<watch::Receiver<bool>> {
        let entries = self.entries.read().await;
        let entry = entries.get(context)?;
        entry.cancel.cancel(reason);
        Some(entry.running.subscribe())
    }

    pub async fn status(&self, context: &ContextId) -> Option<SessionStatus> {
        let entries = self.entries.read().await;
        entries.get(context).map(|e| e.status)
    }

    pub async fn is_running(&self, context: &ContextId) -> bool {
        let entries = self.entries.read().await;
        entries.get(context).is_some_and(|e| *e.running.borrow())
    }

    pub async fn remove(&self, context: &ContextId) {
        let mut entries = self.entries.write().await;
        entries.remove(context);
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
