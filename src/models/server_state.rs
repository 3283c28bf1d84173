use serde::{Deserialize, Serialize};
use std::fmt;

/// Long-running operation currently in progress.
///
/// At most one is pending at any time, see
/// [`OperationTracker`](crate::operations::OperationTracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    None,
    Start,
    Stop,
    MapChange,
    Update,
    Auth,
    Pause,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::None => "none",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::MapChange => "mapchange",
            Operation::Update => "update",
            Operation::Auth => "auth",
            Operation::Pause => "pause",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Operation::None)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle signal of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    Start,
    End,
    Fail,
}

impl OperationAction {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationAction::Start)
    }
}

/// Process and session flags of the controlled server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerState {
    /// Mirror of the operation tracker, kept here for snapshots
    pub operation_pending: Operation,
    pub server_running: bool,
    pub authenticated: bool,
    /// Whether an RCON session is currently held
    pub rcon_connected: bool,
}

impl ServerState {
    /// Flags after the server process went away
    pub fn mark_stopped(&mut self) {
        self.server_running = false;
        self.authenticated = false;
        self.rcon_connected = false;
    }
}
