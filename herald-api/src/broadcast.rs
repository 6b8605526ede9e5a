//! Broadcast Channel
//!
//! A single process-wide fan-out domain. Every published change event goes
//! to every attached session, unfiltered; receivers filter by recipient.
//!
//! ## Ordering
//!
//! `publish` assigns the sequence number and enqueues to every session while
//! holding the registry lock, so all sessions observe events in the same
//! relative order. Per-session queues are unbounded and FIFO, so a slow
//! session never blocks the publisher or other sessions.
//!
//! There is no replay: a session only receives events published after it
//! attached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use herald_core::{BroadcastEnvelope, ChangeEvent, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Registry {
    next_seq: u64,
    sessions: HashMap<SessionId, mpsc::UnboundedSender<BroadcastEnvelope>>,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Sequence number assigned to the event.
    pub seq: u64,
    /// Sessions the event was enqueued to.
    pub delivered: usize,
    /// Sessions found closed during this publish and detached.
    pub dropped: usize,
}

/// Registry of attached sessions plus the single publish operation.
#[derive(Debug, Default)]
pub struct BroadcastChannel {
    registry: Mutex<Registry>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // The registry stays consistent even if a holder panicked.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new session. It receives every event published from now on.
    ///
    /// Dropping the returned [`Subscription`] detaches the session.
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = SessionId::now_v7();
        let count = {
            let mut registry = self.registry();
            registry.sessions.insert(session_id, tx);
            registry.sessions.len()
        };
        debug!(session_id = %session_id, sessions = count, "session attached");
        Subscription {
            session_id,
            receiver: rx,
            channel: Arc::clone(self),
        }
    }

    /// Remove a session. Returns false if it was not attached.
    pub fn detach(&self, session_id: SessionId) -> bool {
        let removed = self.registry().sessions.remove(&session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "session detached");
        }
        removed
    }

    /// Deliver `event` to every attached session.
    pub fn publish(&self, event: ChangeEvent) -> PublishReport {
        let event_type = event.event_type();
        let mut registry = self.registry();
        registry.next_seq += 1;
        let envelope = BroadcastEnvelope {
            seq: registry.next_seq,
            event,
        };

        let mut closed = Vec::new();
        for (session_id, tx) in &registry.sessions {
            if tx.send(envelope.clone()).is_err() {
                closed.push(*session_id);
            } else {
                trace!(session_id = %session_id, seq = envelope.seq, "event enqueued");
            }
        }
        for session_id in &closed {
            registry.sessions.remove(session_id);
        }

        let report = PublishReport {
            seq: envelope.seq,
            delivered: registry.sessions.len(),
            dropped: closed.len(),
        };
        debug!(
            event_type = event_type,
            seq = report.seq,
            receivers = report.delivered,
            dropped = report.dropped,
            "broadcast event"
        );
        report
    }

    pub fn session_count(&self) -> usize {
        self.registry().sessions.len()
    }
}

/// A session's end of the channel.
#[derive(Debug)]
pub struct Subscription {
    session_id: SessionId,
    receiver: mpsc::UnboundedReceiver<BroadcastEnvelope>,
    channel: Arc<BroadcastChannel>,
}

impl Subscription {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Next envelope, in publish order. `None` once detached and drained.
    pub async fn recv(&mut self) -> Option<BroadcastEnvelope> {
        self.receiver.recv().await
    }

    /// Next envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<BroadcastEnvelope> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.detach(self.session_id);
    }
}
