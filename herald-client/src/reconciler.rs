//! Client Reconciler
//!
//! Merges one snapshot fetch with the live event feed. A session processes
//! its feed one input at a time, in receipt order:
//!
//! - while `Loading`, change events are buffered and replayed once the
//!   snapshot is installed
//! - while `Ready`, each event is applied to the view as it arrives
//! - while `Failed`, events are dropped until a reload
//!
//! Every (re)connect of the feed triggers a reload, since the server keeps
//! no history for a session that was away.
//!
//! The current view is published on a `watch` channel, so a slow renderer
//! only ever sees the latest view and never holds up the feed.

use std::collections::VecDeque;
use std::time::Duration;

use herald_core::{BroadcastEnvelope, ChangeEvent, UserId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api_client::SnapshotSource;
use crate::error::ClientError;
use crate::view::{Applied, ClientView, ViewStatus};

/// Input to a reconciler session from the realtime feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The push transport (re)connected; the view must be reloaded.
    Connected,
    Event(BroadcastEnvelope),
    Disconnected { reason: String },
}

pub struct ReconcilerSession<S> {
    view: ClientView,
    source: S,
    fetch_timeout: Duration,
    buffer: VecDeque<ChangeEvent>,
    publisher: watch::Sender<ClientView>,
}

impl<S: SnapshotSource> ReconcilerSession<S> {
    pub fn new(
        user_id: UserId,
        source: S,
        fetch_timeout: Duration,
    ) -> (Self, watch::Receiver<ClientView>) {
        let view = ClientView::new(user_id);
        let (publisher, receiver) = watch::channel(view.clone());
        let session = Self {
            view,
            source,
            fetch_timeout,
            buffer: VecDeque::new(),
            publisher,
        };
        (session, receiver)
    }

    pub fn view(&self) -> &ClientView {
        &self.view
    }

    /// Events waiting for the snapshot.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Fetch a fresh snapshot, buffering feed events that arrive meanwhile.
    ///
    /// Also the retry path out of `Failed`.
    pub async fn load(&mut self, feed: &mut mpsc::Receiver<FeedEvent>) -> Result<(), ClientError> {
        self.view.begin_loading();
        self.buffer.clear();
        self.publish();

        let outcome = 'fetch: loop {
            let fetch = tokio::time::timeout(self.fetch_timeout, self.source.fetch_snapshot());
            tokio::pin!(fetch);
            loop {
                tokio::select! {
                    result = &mut fetch => break 'fetch result,
                    Some(input) = feed.recv() => match input {
                        FeedEvent::Event(envelope) => self.buffer.push_back(envelope.event),
                        FeedEvent::Connected => {
                            // Events may have been missed while disconnected.
                            debug!("feed reconnected during load, restarting fetch");
                            self.buffer.clear();
                            continue 'fetch;
                        }
                        FeedEvent::Disconnected { reason } => {
                            debug!(reason = %reason, "feed disconnected during load")
                        }
                    },
                }
            }
        };

        let result = match outcome {
            Ok(Ok(snapshot)) => {
                self.install(snapshot);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClientError::Timeout {
                after_ms: self.fetch_timeout.as_millis() as u64,
            }),
        };
        if let Err(e) = &result {
            warn!(user_id = %self.view.user_id(), error = %e, "snapshot load failed");
            self.buffer.clear();
            self.view.fail(e.to_string());
        }
        self.publish();
        result
    }

    fn install(&mut self, snapshot: herald_core::Snapshot) {
        let size = snapshot.len();
        self.view.install_snapshot(snapshot);
        let replayed = self.buffer.len();
        while let Some(event) = self.buffer.pop_front() {
            self.view.apply(&event);
        }
        info!(
            user_id = %self.view.user_id(),
            snapshot = size,
            replayed,
            "view ready"
        );
    }

    /// Handle one change event according to the current status.
    pub fn handle_event(&mut self, event: ChangeEvent) -> Applied {
        match self.view.status() {
            ViewStatus::Loading => {
                self.buffer.push_back(event);
                Applied::Ignored
            }
            ViewStatus::Failed { .. } => Applied::Ignored,
            ViewStatus::Ready => {
                let applied = self.view.apply(&event);
                if applied != Applied::Ignored {
                    debug!(
                        event_type = event.event_type(),
                        notification_id = %event.notification_id(),
                        ?applied,
                        "event applied"
                    );
                    self.publish();
                }
                applied
            }
        }
    }

    /// Drive the session until the feed closes.
    pub async fn run(mut self, mut feed: mpsc::Receiver<FeedEvent>) {
        while let Some(input) = feed.recv().await {
            match input {
                FeedEvent::Connected => {
                    // Failure is already reflected in the view.
                    let _ = self.load(&mut feed).await;
                }
                FeedEvent::Event(envelope) => {
                    self.handle_event(envelope.event);
                }
                FeedEvent::Disconnected { reason } => {
                    info!(reason = %reason, "feed disconnected, waiting for reconnect");
                }
            }
        }
        debug!(user_id = %self.view.user_id(), "feed closed, session ending");
    }

    fn publish(&self) {
        self.publisher.send_replace(self.view.clone());
    }
}
