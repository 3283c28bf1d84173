use super::server_info::ServerInfo;
use super::server_state::ServerState;

/// Everything [`StateManager`](crate::state::StateManager) guards behind one lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub server: ServerState,
    pub info: ServerInfo,
}
