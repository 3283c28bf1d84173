//! Change broadcaster.
//!
//! Each subscriber gets a [`Subscription`] bundling receivers for state
//! changes, operation lifecycle events and update progress. Dropping the
//! subscription releases all three, so a dead subscriber leaves nothing
//! behind. Delivery is per-subscriber: a slow subscriber only lags itself.

use crate::metrics::Metrics;
use crate::models::{Operation, OperationAction, ServerInfoView};
use crate::operations::{OperationEvent, OperationTracker, ProgressEvent};
use crate::state::{StateChange, StateManager};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Message delivered to subscribers, serialised as `{"type": ..., "payload": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Envelope {
    /// Full filtered snapshot of the match information
    ServerInfo(ServerInfoView),
    /// Terminal result of a map change
    Mapchange { success: bool },
    Operation {
        operation: Operation,
        action: OperationAction,
    },
    UpdateProgress { step: String, progress: u8 },
}

impl Envelope {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn from_operation(event: OperationEvent) -> Self {
        match (event.operation, event.action) {
            (Operation::MapChange, OperationAction::End) => Envelope::Mapchange { success: true },
            (Operation::MapChange, OperationAction::Fail) => Envelope::Mapchange { success: false },
            (operation, action) => Envelope::Operation { operation, action },
        }
    }
}

/// Hands out subscriptions. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    state: StateManager,
    operations: OperationTracker,
    metrics: Arc<Metrics>,
}

impl Broadcaster {
    pub fn new(state: StateManager, operations: OperationTracker, metrics: Arc<Metrics>) -> Self {
        Self {
            state,
            operations,
            metrics,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            state: self.state.clone(),
            metrics: Arc::clone(&self.metrics),
            state_rx: self.state.subscribe(),
            operation_rx: self.operations.subscribe(),
            progress_rx: self.operations.subscribe_progress(),
        }
    }
}

/// One subscriber's view of the event streams.
pub struct Subscription {
    state: StateManager,
    metrics: Arc<Metrics>,
    state_rx: broadcast::Receiver<StateChange>,
    operation_rx: broadcast::Receiver<OperationEvent>,
    progress_rx: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
    /// Current snapshot without waiting for a change (`infoRequest`)
    pub fn info_request(&self) -> Envelope {
        self.deliver(Envelope::ServerInfo(self.state.info_view()))
    }

    /// Wait for the next envelope. `None` once the sources are gone.
    ///
    /// Match information changes are delivered as a fresh full snapshot, so a
    /// lagging subscriber just receives the latest state.
    pub async fn next(&mut self) -> Option<Envelope> {
        loop {
            tokio::select! {
                change = self.state_rx.recv() => match change {
                    Ok(StateChange::ServerInfoChanged | StateChange::StateReset) => {
                        return Some(self.info_request());
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Subscriber lagged by {} state changes", skipped);
                        return Some(self.info_request());
                    }
                    Err(RecvError::Closed) => return None,
                },
                event = self.operation_rx.recv() => match event {
                    Ok(event) => return Some(self.deliver(Envelope::from_operation(event))),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscriber missed {} operation events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
                progress = self.progress_rx.recv() => match progress {
                    Ok(ProgressEvent { step, progress }) => {
                        return Some(self.deliver(Envelope::UpdateProgress { step, progress }));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Subscriber missed {} progress events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    fn deliver(&self, envelope: Envelope) -> Envelope {
        self.metrics.record_broadcast();
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn broadcaster() -> (Broadcaster, StateManager, OperationTracker) {
        let state = StateManager::new();
        let operations = OperationTracker::new(state.clone());
        let broadcaster = Broadcaster::new(state.clone(), operations.clone(), Arc::new(Metrics::new()));
        (broadcaster, state, operations)
    }

    async fn next(subscription: &mut Subscription) -> Envelope {
        tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_info_change_sends_full_snapshot() {
        let (broadcaster, state, _) = broadcaster();
        let mut subscription = broadcaster.subscribe();

        state.set_map("de_overpass");

        match next(&mut subscription).await {
            Envelope::ServerInfo(view) => assert_eq!(view.map, "de_overpass"),
            other => panic!("unexpected envelope {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_only_change_is_not_forwarded() {
        let (broadcaster, state, _) = broadcaster();
        let mut subscription = broadcaster.subscribe();

        state.set_server_running(true);
        state.set_pause(true);

        match next(&mut subscription).await {
            Envelope::ServerInfo(view) => assert!(view.pause),
            other => panic!("unexpected envelope {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_operation_and_progress_envelopes() {
        let (broadcaster, _, operations) = broadcaster();
        let mut subscription = broadcaster.subscribe();

        operations.begin(Operation::MapChange).unwrap();
        operations.fail(Operation::MapChange);
        operations.report_progress("Login OK", 100);

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(next(&mut subscription).await);
        }

        assert!(received.contains(&Envelope::Operation {
            operation: Operation::MapChange,
            action: OperationAction::Start
        }));
        assert!(received.contains(&Envelope::Mapchange { success: false }));
        assert!(received.contains(&Envelope::UpdateProgress {
            step: "Login OK".to_string(),
            progress: 100
        }));
    }

    #[test]
    fn test_envelope_json_shape() {
        let json = Envelope::UpdateProgress {
            step: "Verifying client installation".to_string(),
            progress: 0,
        }
        .to_json()
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"updateProgress","payload":{"step":"Verifying client installation","progress":0}}"#
        );

        let json = Envelope::Operation {
            operation: Operation::Update,
            action: OperationAction::End,
        }
        .to_json()
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"operation","payload":{"operation":"update","action":"end"}}"#
        );
    }

    #[test]
    fn test_info_request_serialises_camel_case() {
        let (broadcaster, state, _) = broadcaster();
        state.set_max_rounds(24);
        let subscription = broadcaster.subscribe();

        let json = subscription.info_request().to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"serverInfo","payload":{"map":"""#));
        assert!(json.contains(r#""maxRounds":24"#));
        assert!(json.contains(r#""mapsAvail":[]"#));
    }

    #[test]
    fn test_drop_releases_receivers() {
        let (broadcaster, state, operations) = broadcaster();
        let subscription = broadcaster.subscribe();
        assert_eq!(state.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(state.subscriber_count(), 0);

        // Emitting with nobody listening is fine
        state.set_map("de_dust2");
        operations.report_progress("Login OK", 100);
    }
}
