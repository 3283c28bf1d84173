// State management module
//
// This module provides the StateManager which wraps ControlState with thread-safe access
// using Arc<RwLock<T>> and emits change events for subscribers.

use crate::models::{
    ControlState, MapDetail, MapFilterType, Operation, ServerInfo, ServerInfoView, Team, TeamSide,
};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Pending operation has changed
    OperationChanged { operation: Operation },

    /// Process or session flags have changed
    ServerStatusChanged {
        running: bool,
        authenticated: bool,
        rcon_connected: bool,
    },

    /// Match information has changed
    ServerInfoChanged,

    /// Match information was reset after the server went away
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the single owner of [`ControlState`]. Components receive a clone
/// (all clones share the same state and channel) instead of reaching for a
/// global.
///
/// - [`read()`](Self::read) for reading state through a closure
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    state: Arc<RwLock<ControlState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100 event buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ControlState::default())),
            state_tx,
        }
    }

    /// Clone of the entire state
    pub fn snapshot(&self) -> ControlState {
        self.read(|state| state.clone())
    }

    /// Filtered view of the match information, as sent to subscribers
    pub fn info_view(&self) -> ServerInfoView {
        self.read(|state| state.info.view())
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ControlState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, then emits one event per
    /// changed area.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut ControlState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Mutate only the match information
    pub fn update_info<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut ServerInfo),
    {
        self.update(|state| update_fn(&mut state.info))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state_tx.receiver_count()
    }

    fn detect_changes(old: &ControlState, new: &ControlState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.server.operation_pending != new.server.operation_pending {
            changes.push(StateChange::OperationChanged {
                operation: new.server.operation_pending,
            });
        }

        if old.server.server_running != new.server.server_running
            || old.server.authenticated != new.server.authenticated
            || old.server.rcon_connected != new.server.rcon_connected
        {
            changes.push(StateChange::ServerStatusChanged {
                running: new.server.server_running,
                authenticated: new.server.authenticated,
                rcon_connected: new.server.rcon_connected,
            });
        }

        if old.info != new.info {
            changes.push(StateChange::ServerInfoChanged);
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn operation_pending(&self) -> Operation {
        self.read(|state| state.server.operation_pending)
    }

    pub fn is_running(&self) -> bool {
        self.read(|state| state.server.server_running)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|state| state.server.authenticated)
    }

    pub fn set_operation(&self, operation: Operation) -> Vec<StateChange> {
        self.update(|state| state.server.operation_pending = operation)
    }

    pub fn set_server_running(&self, running: bool) -> Vec<StateChange> {
        self.update(|state| state.server.server_running = running)
    }

    pub fn set_authenticated(&self, authenticated: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.server.authenticated = authenticated;
            state.server.rcon_connected = authenticated;
        })
    }

    pub fn set_map(&self, map: &str) -> Vec<StateChange> {
        self.update_info(|info| info.current_map = map.to_string())
    }

    pub fn set_max_rounds(&self, rounds: u32) -> Vec<StateChange> {
        self.update_info(|info| info.max_rounds = rounds)
    }

    pub fn set_pause(&self, pause: bool) -> Vec<StateChange> {
        self.update_info(|info| info.pause = pause)
    }

    pub fn set_score(&self, side: TeamSide, score: u32) -> Vec<StateChange> {
        self.update_info(|info| info.set_score(side, score))
    }

    /// Replace the catalog; available names follow the catalog order
    pub fn set_maps(&self, details: Vec<MapDetail>) -> Vec<StateChange> {
        self.update_info(|info| {
            info.maps_available = details.iter().map(|d| d.name.clone()).collect();
            info.maps_details = details;
        })
    }

    pub fn find_map(&self, identifier: &str) -> Option<MapDetail> {
        self.read(|state| state.info.find_map(identifier).cloned())
    }

    pub fn set_map_filter_type(&self, filter_type: MapFilterType) -> Vec<StateChange> {
        self.update_info(|info| info.map_filter_type = filter_type)
    }

    pub fn map_filter_add(&self, filter: &str) -> usize {
        let mut len = 0;
        self.update_info(|info| len = info.map_filter_add(filter));
        len
    }

    pub fn map_filter_remove(&self, filter: &str) -> usize {
        let mut len = 0;
        self.update_info(|info| len = info.map_filter_remove(filter));
        len
    }

    pub fn map_filter_reset(&self) -> Vec<StateChange> {
        self.update_info(ServerInfo::map_filter_reset)
    }

    pub fn add_player(&self, name: &str, steam_id: &str) -> Vec<StateChange> {
        self.update_info(|info| info.add_player(name, steam_id))
    }

    pub fn assign_player(&self, name: &str, steam_id: &str, team: Team) -> Vec<StateChange> {
        self.update_info(|info| info.assign_player(name, steam_id, team))
    }

    pub fn remove_player(&self, steam_id: &str) -> Vec<StateChange> {
        self.update_info(|info| info.remove_player(steam_id))
    }

    pub fn record_kill(&self, killer: Option<&str>, victim: Option<&str>) -> Vec<StateChange> {
        self.update_info(|info| info.record_kill(killer, victim))
    }

    /// New map loaded: players are dropped and the match counters restart
    pub fn map_loaded(&self, map: &str) -> Vec<StateChange> {
        self.update_info(|info| {
            info.current_map = map.to_string();
            info.clear_players();
            info.new_match();
        })
    }

    pub fn new_match(&self) -> Vec<StateChange> {
        self.update_info(ServerInfo::new_match)
    }

    /// Server went away: flags drop and match information is cleared
    pub fn server_stopped(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.server.mark_stopped();
            state.info.reset();
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
