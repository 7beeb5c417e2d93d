//! Action dispatch with at most one outstanding request per server and kind.

use crate::error::SyncError;
use async_trait::async_trait;
use log::{info, warn};
use parking_lot::Mutex;
use shared::{ActionKind, ActionOutcome, ActionRequest, ServerId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Sends one action request to the backend and reports how it went.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn send(&self, request: &ActionRequest) -> Result<(), SyncError>;
}

#[async_trait]
impl<T: ActionTransport + ?Sized> ActionTransport for Arc<T> {
    async fn send(&self, request: &ActionRequest) -> Result<(), SyncError> {
        (**self).send(request).await
    }
}

/// Follow-up work the dispatcher asks of the sync loop once a request completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// The server is known to be gone; drop its card now.
    Evict(ServerId),
    /// Fetch a fresh snapshot outside the poll cycle.
    Refresh,
}

type PendingKey = (ServerId, ActionKind);

/// Holds a `(uuid, kind)` slot until dropped.
struct InFlight<'a> {
    pending: &'a Mutex<HashSet<PendingKey>>,
    key: PendingKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}

pub struct Dispatcher<T> {
    transport: T,
    pending: Mutex<HashSet<PendingKey>>,
    action_timeout: Duration,
    sync_tx: mpsc::UnboundedSender<SyncRequest>,
}

impl<T: ActionTransport> Dispatcher<T> {
    pub fn new(
        transport: T,
        action_timeout: Duration,
        sync_tx: mpsc::UnboundedSender<SyncRequest>,
    ) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashSet::new()),
            action_timeout,
            sync_tx,
        }
    }

    pub fn is_pending(&self, uuid: &ServerId, kind: ActionKind) -> bool {
        self.pending.lock().contains(&(uuid.clone(), kind))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Issues `request` and waits for it, bounded by the configured timeout.
    ///
    /// `Busy` and `InvalidInput` never touch the network and trigger nothing. Every
    /// other outcome is followed by a refresh request; a successful delete or a
    /// not-found answer also evicts the card first. A timed-out request is reported
    /// as a failure but may still complete on the backend.
    pub async fn dispatch(&self, request: ActionRequest) -> ActionOutcome {
        if !has_valid_payload(&request) {
            warn!(
                "Rejected {} on {}: player name required",
                request.kind, request.uuid
            );
            return ActionOutcome::InvalidInput;
        }

        let guard = match self.claim(&request) {
            Some(guard) => guard,
            None => {
                warn!(
                    "{} on {} is already in progress",
                    request.kind, request.uuid
                );
                return ActionOutcome::Busy;
            }
        };

        info!("Dispatching {} on {}", request.kind, request.uuid);
        let result = match timeout(self.action_timeout, self.transport.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Transport(format!(
                "no response after {}s",
                self.action_timeout.as_secs_f32()
            ))),
        };
        drop(guard);

        let outcome = match result {
            Ok(()) => {
                info!("{} on {} succeeded", request.kind, request.uuid);
                if request.kind == ActionKind::Delete {
                    self.request_sync(SyncRequest::Evict(request.uuid.clone()));
                }
                ActionOutcome::Success
            }
            Err(err @ SyncError::NotFound { .. }) => {
                warn!("{} on {} failed: {}", request.kind, request.uuid, err);
                let reason = err.reason();
                if let SyncError::NotFound { uuid, .. } = err {
                    self.request_sync(SyncRequest::Evict(uuid));
                }
                ActionOutcome::Failure(reason)
            }
            Err(err) => {
                warn!("{} on {} failed: {}", request.kind, request.uuid, err);
                ActionOutcome::Failure(err.reason())
            }
        };

        self.request_sync(SyncRequest::Refresh);
        outcome
    }

    fn claim(&self, request: &ActionRequest) -> Option<InFlight<'_>> {
        let key = (request.uuid.clone(), request.kind);
        if !self.pending.lock().insert(key.clone()) {
            return None;
        }

        Some(InFlight {
            pending: &self.pending,
            key,
        })
    }

    fn request_sync(&self, request: SyncRequest) {
        if self.sync_tx.send(request).is_err() {
            warn!("Sync loop is gone; follow-up request dropped");
        }
    }
}

fn has_valid_payload(request: &ActionRequest) -> bool {
    if !request.kind.requires_payload() {
        return true;
    }

    request
        .payload
        .as_deref()
        .map_or(false, |name| !name.trim().is_empty())
}
