//! In-memory progress registry with push notifications.
//!
//! The hub owns every `ProgressOperation`. Stages that own a piece of work
//! hold only its id and a clone of the hub. Subscribers are invoked while
//! the registry lock is held, so all subscribers of an operation observe
//! every update in exactly the order it was applied. Callbacks must
//! therefore be cheap and must not call back into the hub.
//!
//! Once an operation reaches `completed` or `failed` it is frozen: further
//! `update`, `complete` and `fail` calls return
//! [`ProgressError::AlreadyFinished`] and notify nobody.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ProgressError;
use crate::models::{OperationType, ProgressOperation, ProgressStatus, ProgressUpdate};

/// Subscriber callback
pub type ProgressCallback = Arc<dyn Fn(&ProgressOperation) + Send + Sync>;

struct Tracked {
    operation: ProgressOperation,
    subscribers: Vec<(u64, ProgressCallback)>,
    finished_at: Option<Instant>,
    cancel: CancellationToken,
}

impl Tracked {
    fn new(id: Uuid, operation_type: OperationType, total: u64) -> Self {
        Self {
            operation: ProgressOperation::new(id, operation_type, total),
            subscribers: Vec::new(),
            finished_at: None,
            cancel: CancellationToken::new(),
        }
    }

    fn notify(&self) {
        for (_, callback) in &self.subscribers {
            callback(&self.operation);
        }
    }
}

#[derive(Default)]
struct HubInner {
    operations: Mutex<HashMap<Uuid, Tracked>>,
    next_subscriber: AtomicU64,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Tracked>> {
        self.operations.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove_subscriber(&self, id: Uuid, subscriber: u64) {
        if let Some(tracked) = self.lock().get_mut(&id) {
            tracked.subscribers.retain(|(sid, _)| *sid != subscriber);
        }
    }
}

/// Shared progress registry; clones share state
#[derive(Clone, Default)]
pub struct ProgressHub {
    inner: Arc<HubInner>,
}

/// Active subscription. Dropping it unsubscribes.
pub struct Subscription {
    hub: Weak<HubInner>,
    operation_id: Uuid,
    subscriber_id: u64,
    snapshot: ProgressOperation,
}

impl Subscription {
    /// State of the operation at the moment of subscribing
    pub fn snapshot(&self) -> &ProgressOperation {
        &self.snapshot
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove_subscriber(self.operation_id, self.subscriber_id);
        }
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new operation with a generated id
    pub fn create(&self, operation_type: OperationType, total: u64) -> Uuid {
        let id = Uuid::new_v4();
        // A fresh v4 id cannot collide with an existing entry in practice
        let _ = self.create_with_id(id, operation_type, total);
        id
    }

    /// Registers an operation under a caller-chosen id
    pub fn create_with_id(
        &self,
        id: Uuid,
        operation_type: OperationType,
        total: u64,
    ) -> Result<(), ProgressError> {
        let mut operations = self.inner.lock();
        if operations.contains_key(&id) {
            return Err(ProgressError::AlreadyExists(id));
        }

        operations.insert(id, Tracked::new(id, operation_type, total));
        log::debug!("Created {:?} operation {} (total {})", operation_type, id, total);
        Ok(())
    }

    /// Reuses a pre-created, unfinished operation of the same type or creates it.
    ///
    /// The check and the total update happen under one lock.
    pub fn ensure(
        &self,
        id: Option<Uuid>,
        operation_type: OperationType,
        total: u64,
    ) -> Result<Uuid, ProgressError> {
        let Some(id) = id else {
            return Ok(self.create(operation_type, total));
        };

        let mut operations = self.inner.lock();
        match operations.get_mut(&id) {
            Some(tracked) if tracked.finished_at.is_some() => {
                Err(ProgressError::AlreadyFinished(id))
            }
            Some(tracked) if tracked.operation.operation_type != operation_type => {
                Err(ProgressError::TypeMismatch {
                    id,
                    expected: operation_type,
                    found: tracked.operation.operation_type,
                })
            }
            Some(tracked) => {
                tracked.operation.apply(ProgressUpdate::new().total(total));
                tracked.notify();
                Ok(id)
            }
            None => {
                operations.insert(id, Tracked::new(id, operation_type, total));
                log::debug!("Created {:?} operation {} (total {})", operation_type, id, total);
                Ok(id)
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<ProgressOperation> {
        self.inner.lock().get(&id).map(|t| t.operation.clone())
    }

    /// Merges `update` into the operation and notifies subscribers.
    ///
    /// A terminal status in the update finishes the operation.
    pub fn update(&self, id: Uuid, update: ProgressUpdate) -> Result<ProgressOperation, ProgressError> {
        let mut operations = self.inner.lock();
        let tracked = operations.get_mut(&id).ok_or(ProgressError::NotFound(id))?;
        if tracked.finished_at.is_some() {
            return Err(ProgressError::AlreadyFinished(id));
        }

        tracked.operation.apply(update);
        if tracked.operation.status.is_terminal() {
            tracked.finished_at = Some(Instant::now());
        }
        tracked.notify();
        Ok(tracked.operation.clone())
    }

    /// Marks the operation completed and notifies one last time
    pub fn complete(&self, id: Uuid, message: impl Into<String>) -> Result<ProgressOperation, ProgressError> {
        self.update(
            id,
            ProgressUpdate::new()
                .status(ProgressStatus::Completed)
                .message(message),
        )
    }

    /// Marks the operation failed and notifies one last time
    pub fn fail(&self, id: Uuid, message: impl Into<String>) -> Result<ProgressOperation, ProgressError> {
        self.update(
            id,
            ProgressUpdate::new()
                .status(ProgressStatus::Failed)
                .message(message),
        )
    }

    /// Registers `callback` for every future update of `id`
    pub fn subscribe<F>(&self, id: Uuid, callback: F) -> Result<Subscription, ProgressError>
    where
        F: Fn(&ProgressOperation) + Send + Sync + 'static,
    {
        let subscriber_id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let mut operations = self.inner.lock();
        let tracked = operations.get_mut(&id).ok_or(ProgressError::NotFound(id))?;

        // Finished operations never notify again; no need to keep the callback
        if tracked.finished_at.is_none() {
            tracked.subscribers.push((subscriber_id, Arc::new(callback)));
        }

        Ok(Subscription {
            hub: Arc::downgrade(&self.inner),
            operation_id: id,
            subscriber_id,
            snapshot: tracked.operation.clone(),
        })
    }

    /// Cancellation token of the run that owns `id`
    pub fn cancellation_token(&self, id: Uuid) -> Result<CancellationToken, ProgressError> {
        self.inner
            .lock()
            .get(&id)
            .map(|t| t.cancel.clone())
            .ok_or(ProgressError::NotFound(id))
    }

    /// Requests cancellation of the run that owns `id`
    pub fn cancel(&self, id: Uuid) -> Result<(), ProgressError> {
        let operations = self.inner.lock();
        let tracked = operations.get(&id).ok_or(ProgressError::NotFound(id))?;
        if tracked.finished_at.is_some() {
            return Err(ProgressError::AlreadyFinished(id));
        }
        log::info!("Cancellation requested for operation {}", id);
        tracked.cancel.cancel();
        Ok(())
    }

    /// Drops operations that finished more than `grace` ago. Returns how many.
    pub fn purge_finished(&self, grace: Duration) -> usize {
        let now = Instant::now();
        let mut operations = self.inner.lock();
        let before = operations.len();
        operations.retain(|_, t| match t.finished_at {
            Some(at) => now.saturating_duration_since(at) < grace,
            None => true,
        });
        before - operations.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purges finished operations
    pub fn spawn_reaper(&self, grace: Duration, interval: Duration) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let purged = hub.purge_finished(grace);
                if purged > 0 {
                    log::debug!("Purged {} finished progress operations", purged);
                }
            }
        })
    }
}
