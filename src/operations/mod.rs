//! Operation state machine.
//!
//! Long-running controller actions (start, stop, mapchange, update, auth,
//! pause) are mutually exclusive: [`OperationTracker::begin`] checks and sets
//! the pending operation under one lock, and every path out of an operation
//! calls [`end`](OperationTracker::end) or [`fail`](OperationTracker::fail),
//! which resets it to `none`.
//!
//! Authentication is the exception. It may start while another operation is
//! pending (the server's log stream triggers it during `start`); the
//! interrupted operation is parked and restored when the handshake finishes.

use crate::models::{Operation, OperationAction};
use crate::state::StateManager;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;

/// Another operation holds the tracker
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Another operation is pending: {0}")]
pub struct OperationPending(pub Operation);

/// Lifecycle notification for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationEvent {
    pub operation: Operation,
    pub action: OperationAction,
}

/// Progress of a long-running operation (currently only updates)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub step: String,
    pub progress: u8,
}

/// Result of asking to authenticate
pub enum AuthTicket {
    /// Already authenticated, nothing to do
    Authenticated,
    /// Caller owns the handshake and must call [`OperationTracker::finish_auth`]
    Lead,
    /// A handshake is in flight; wait for its outcome
    Follow(OperationWaiter),
}

#[derive(Debug, Default)]
struct TrackerInner {
    pending: Operation,
    /// Operation interrupted by an in-flight handshake
    suspended: Option<Operation>,
}

/// Single-slot operation tracker with event fan-out.
///
/// Cloning shares the same slot and channels.
#[derive(Clone)]
pub struct OperationTracker {
    inner: Arc<Mutex<TrackerInner>>,
    events_tx: broadcast::Sender<OperationEvent>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    state: StateManager,
}

impl OperationTracker {
    pub fn new(state: StateManager) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        let (progress_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(TrackerInner::default())),
            events_tx,
            progress_tx,
            state,
        }
    }

    pub fn pending(&self) -> Operation {
        self.lock().pending
    }

    /// Fails when any operation is pending, without claiming the slot.
    pub fn ensure_idle(&self) -> Result<(), OperationPending> {
        match self.lock().pending {
            Operation::None => Ok(()),
            other => Err(OperationPending(other)),
        }
    }

    /// Claim the slot for `operation` and emit its `start`.
    pub fn begin(&self, operation: Operation) -> Result<(), OperationPending> {
        let mut inner = self.lock();
        if !inner.pending.is_none() {
            return Err(OperationPending(inner.pending));
        }

        inner.pending = operation;
        self.state.set_operation(operation);
        self.emit(operation, OperationAction::Start);
        tracing::debug!("Operation {} started", operation);
        Ok(())
    }

    /// Complete `operation`. Returns false when it was not pending.
    pub fn end(&self, operation: Operation) -> bool {
        self.finish(operation, OperationAction::End)
    }

    /// Fail `operation`. Returns false when it was not pending.
    pub fn fail(&self, operation: Operation) -> bool {
        self.finish(operation, OperationAction::Fail)
    }

    fn finish(&self, operation: Operation, action: OperationAction) -> bool {
        let mut inner = self.lock();

        if inner.pending == operation && !operation.is_none() {
            inner.pending = Operation::None;
            self.state.set_operation(Operation::None);
        } else if inner.suspended == Some(operation) {
            inner.suspended = None;
        } else {
            return false;
        }

        self.emit(operation, action);
        tracing::debug!("Operation {} finished: {:?}", operation, action);
        true
    }

    /// Fail whatever is pending. Used when the server is killed.
    pub fn abort(&self) -> Option<Operation> {
        let mut inner = self.lock();
        let pending = std::mem::take(&mut inner.pending);
        let suspended = inner.suspended.take();

        if pending.is_none() {
            return None;
        }

        self.state.set_operation(Operation::None);
        self.emit(pending, OperationAction::Fail);
        if let Some(op) = suspended {
            self.emit(op, OperationAction::Fail);
        }
        tracing::warn!("Operation {} aborted", pending);
        Some(pending)
    }

    /// Decide how an authentication request proceeds.
    ///
    /// The waiter for a follower is created under the lock, so the leader's
    /// outcome cannot slip past it.
    pub fn begin_auth(&self) -> AuthTicket {
        let mut inner = self.lock();

        if self.state.is_authenticated() {
            return AuthTicket::Authenticated;
        }

        match inner.pending {
            Operation::Auth => AuthTicket::Follow(self.waiter(Operation::Auth)),
            Operation::None => {
                inner.pending = Operation::Auth;
                self.state.set_operation(Operation::Auth);
                self.emit(Operation::Auth, OperationAction::Start);
                AuthTicket::Lead
            }
            other => {
                inner.suspended = Some(other);
                inner.pending = Operation::Auth;
                self.state.set_operation(Operation::Auth);
                self.emit(Operation::Auth, OperationAction::Start);
                AuthTicket::Lead
            }
        }
    }

    /// Complete the handshake started through [`AuthTicket::Lead`].
    pub fn finish_auth(&self, success: bool) {
        let mut inner = self.lock();
        if inner.pending != Operation::Auth {
            return;
        }

        inner.pending = inner.suspended.take().unwrap_or_default();
        self.state.set_operation(inner.pending);

        let action = if success {
            OperationAction::End
        } else {
            OperationAction::Fail
        };
        self.emit(Operation::Auth, action);
    }

    /// One-shot waiter for the next terminal event of `operation`.
    ///
    /// Create it before triggering the action whose completion it observes.
    pub fn waiter(&self, operation: Operation) -> OperationWaiter {
        OperationWaiter {
            operation,
            rx: self.events_tx.subscribe(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.events_tx.subscribe()
    }

    pub fn report_progress(&self, step: impl Into<String>, progress: u8) {
        let event = ProgressEvent {
            step: step.into(),
            progress: progress.min(100),
        };
        tracing::debug!("Progress: {} ({}%)", event.step, event.progress);
        // Ignore send errors - it's OK if no one is listening
        let _ = self.progress_tx.send(event);
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    fn emit(&self, operation: Operation, action: OperationAction) {
        let _ = self.events_tx.send(OperationEvent { operation, action });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Future-like handle resolving on an operation's `end` or `fail`.
///
/// Dropping it deregisters the listener.
pub struct OperationWaiter {
    operation: Operation,
    rx: broadcast::Receiver<OperationEvent>,
}

impl OperationWaiter {
    /// Returns `None` if the tracker is gone.
    pub async fn wait(mut self) -> Option<OperationAction> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.operation == self.operation && event.action.is_terminal() => {
                    return Some(event.action);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Operation waiter lagged by {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker() -> (OperationTracker, StateManager) {
        let state = StateManager::new();
        (OperationTracker::new(state.clone()), state)
    }

    #[test]
    fn test_begin_rejects_while_pending() {
        let (tracker, state) = tracker();
        tracker.begin(Operation::MapChange).unwrap();

        let err = tracker.begin(Operation::Stop).unwrap_err();
        assert_eq!(err, OperationPending(Operation::MapChange));
        assert_eq!(err.to_string(), "Another operation is pending: mapchange");
        assert_eq!(state.operation_pending(), Operation::MapChange);
    }

    #[test]
    fn test_end_resets_to_none_and_emits() {
        let (tracker, state) = tracker();
        let mut rx = tracker.subscribe();

        tracker.begin(Operation::Update).unwrap();
        assert!(tracker.end(Operation::Update));
        assert!(!tracker.end(Operation::Update));

        assert_eq!(tracker.pending(), Operation::None);
        assert_eq!(state.operation_pending(), Operation::None);
        assert_eq!(rx.try_recv().unwrap().action, OperationAction::Start);
        assert_eq!(rx.try_recv().unwrap().action, OperationAction::End);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fail_of_other_operation_is_ignored() {
        let (tracker, _) = tracker();
        tracker.begin(Operation::Start).unwrap();

        assert!(!tracker.fail(Operation::MapChange));
        assert_eq!(tracker.pending(), Operation::Start);
    }

    #[test]
    fn test_auth_suspends_and_restores() {
        let (tracker, state) = tracker();
        tracker.begin(Operation::Start).unwrap();

        assert!(matches!(tracker.begin_auth(), AuthTicket::Lead));
        assert_eq!(tracker.pending(), Operation::Auth);

        state.set_authenticated(true);
        tracker.finish_auth(true);
        assert_eq!(tracker.pending(), Operation::Start);

        assert!(tracker.end(Operation::Start));
        assert_eq!(tracker.pending(), Operation::None);
    }

    #[test]
    fn test_suspended_operation_can_fail_during_auth() {
        let (tracker, _) = tracker();
        tracker.begin(Operation::Start).unwrap();
        assert!(matches!(tracker.begin_auth(), AuthTicket::Lead));

        assert!(tracker.fail(Operation::Start));
        tracker.finish_auth(false);
        assert_eq!(tracker.pending(), Operation::None);
    }

    #[test]
    fn test_begin_auth_when_authenticated() {
        let (tracker, state) = tracker();
        state.set_authenticated(true);
        assert!(matches!(tracker.begin_auth(), AuthTicket::Authenticated));
        assert_eq!(tracker.pending(), Operation::None);
    }

    #[tokio::test]
    async fn test_follower_gets_leader_outcome() {
        let (tracker, _) = tracker();
        assert!(matches!(tracker.begin_auth(), AuthTicket::Lead));

        let waiter = match tracker.begin_auth() {
            AuthTicket::Follow(waiter) => waiter,
            _ => panic!("expected follower"),
        };

        let leader = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            leader.finish_auth(false);
        });

        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter.wait())
            .await
            .unwrap();
        assert_eq!(outcome, Some(OperationAction::Fail));
    }

    #[tokio::test]
    async fn test_waiter_ignores_other_operations() {
        let (tracker, _) = tracker();
        let waiter = tracker.waiter(Operation::MapChange);

        tracker.begin(Operation::Pause).unwrap();
        tracker.end(Operation::Pause);
        tracker.begin(Operation::MapChange).unwrap();
        tracker.end(Operation::MapChange);

        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter.wait())
            .await
            .unwrap();
        assert_eq!(outcome, Some(OperationAction::End));
    }

    #[test]
    fn test_abort_fails_pending() {
        let (tracker, _) = tracker();
        let mut rx = tracker.subscribe();
        tracker.begin(Operation::Update).unwrap();

        assert_eq!(tracker.abort(), Some(Operation::Update));
        assert_eq!(tracker.pending(), Operation::None);
        assert_eq!(tracker.abort(), None);

        rx.try_recv().unwrap();
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.operation, Operation::Update);
        assert_eq!(failed.action, OperationAction::Fail);
    }

    #[test]
    fn test_progress_is_capped() {
        let (tracker, _) = tracker();
        let mut rx = tracker.subscribe_progress();
        tracker.report_progress("Downloading", 250);

        assert_eq!(rx.try_recv().unwrap().progress, 100);
    }
}
