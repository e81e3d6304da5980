//! Session manager: a process-wide registry mapping identity to
//! session, with single-owner-per-identity eviction and fan-out relay.
//!
//! `add_session` never holds the map lock while waiting on a prior
//! session's removal -- it drops the lock before blocking on the
//! removed-latch and re-acquires it after, so a slow eviction can't
//! stall unrelated lookups.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::identity::IdentityKey;
use crate::rate_limit::RateClassConfig;
use crate::session::{EnqueueOutcome, OutboundMessage, Session};

struct Slot {
    session: Arc<Session>,
    removed: Arc<Notify>,
}

#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<IdentityKey, Slot>,
}

impl SessionManager {
    pub fn new() -> SessionManager {
        SessionManager::default()
    }

    /// Registers a new session for `identity`, evicting any prior one,
    /// releasing the map lock while waiting for that eviction to
    /// complete so other identities keep making progress.
    pub async fn add_session(
        &self,
        identity: IdentityKey,
        display_name: String,
        remote_addr: std::net::SocketAddr,
        rate_classes: &[RateClassConfig],
        cancel: &CancellationToken,
    ) -> Result<Arc<Session>, SessionError> {
        if let Some(entry) = self.sessions.get(&identity) {
            let existing_session = entry.session.clone();
            let removed = entry.removed.clone();
            // Release the shard lock before blocking on the prior
            // session's removal: never hold the map lock while waiting.
            drop(entry);

            existing_session.request_stop();
            tokio::select! {
                _ = removed.notified() => {}
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            }

            // Step 3: if another session appeared for this identity while
            // we were waiting, the caller must retry or abort.
            if self.sessions.contains_key(&identity) {
                return Err(SessionError::SessionConflict);
            }
        }

        let session = Arc::new(Session::new(
            identity.clone(),
            display_name,
            remote_addr,
            rate_classes,
        ));
        self.sessions.insert(
            identity,
            Slot {
                session: session.clone(),
                removed: Arc::new(Notify::new()),
            },
        );
        Ok(session)
    }

    /// Deletes the slot only if it still holds the
    /// exact session passed in, then fires the removed latch regardless
    /// (a stale caller's removal attempt still needs to stop blocking
    /// waiters if it was in fact the current occupant).
    pub fn remove_session(&self, identity: &IdentityKey, session: &Arc<Session>) {
        let matched = self
            .sessions
            .get(identity)
            .map(|entry| Arc::ptr_eq(&entry.session, session))
            .unwrap_or(false);
        if matched {
            if let Some((_, slot)) = self.sessions.remove(identity) {
                slot.removed.notify_one();
            }
        }
    }

    /// Looks up a session by identity; only visible once signon is complete.
    pub fn retrieve_session(&self, identity: &IdentityKey) -> Option<Arc<Session>> {
        self.sessions.get(identity).and_then(|entry| {
            if entry.session.signon_complete() {
                Some(entry.session.clone())
            } else {
                None
            }
        })
    }

    /// Snapshot of the signon-complete subset.
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|entry| entry.session.signon_complete())
            .map(|entry| entry.session.clone())
            .collect()
    }

    fn enqueue_or_evict(&self, identity: &IdentityKey, session: &Arc<Session>, msg: OutboundMessage) {
        match session.try_enqueue(msg) {
            EnqueueOutcome::Delivered => {}
            EnqueueOutcome::SendClosed => {}
            EnqueueOutcome::QueueFull => {
                // Backpressure becomes eviction rather than head-of-line
                // blocking the relay loop.
                log::warn!("evicting session for {identity} after outbound queue overflow");
                session.request_stop();
                self.remove_session(identity, session);
            }
        }
    }

    /// Fans a message out to every signon-complete session.
    pub fn relay_to_all(&self, msg: OutboundMessage) {
        // Collect first and evict after the iterator is dropped: a
        // `QueueFull` eviction takes the shard's write lock via
        // `remove_session`, which would deadlock against the read lock
        // `self.sessions.iter()` still holds on that same shard.
        let mut to_evict = Vec::new();
        for entry in self.sessions.iter() {
            if !entry.session.signon_complete() {
                continue;
            }
            match entry.session.try_enqueue(msg.clone()) {
                EnqueueOutcome::Delivered => {}
                EnqueueOutcome::SendClosed => {}
                EnqueueOutcome::QueueFull => {
                    to_evict.push((entry.key().clone(), entry.session.clone()));
                }
            }
        }
        for (identity, session) in to_evict {
            log::warn!("evicting session for {identity} after outbound queue overflow");
            session.request_stop();
            self.remove_session(&identity, &session);
        }
    }

    /// Fans a message out to the named identities only.
    pub fn relay_to_identities(&self, identities: &[IdentityKey], msg: OutboundMessage) {
        for identity in identities {
            if let Some(entry) = self.sessions.get(identity) {
                if !entry.session.signon_complete() {
                    continue;
                }
                let session = entry.session.clone();
                drop(entry);
                self.enqueue_or_evict(identity, &session, msg.clone());
            }
        }
    }
}

impl Clone for OutboundMessage {
    fn clone(&self) -> Self {
        OutboundMessage(self.0.clone())
    }
}
