//! Data models for the control daemon.
//!
//! - [`ServerState`]: process/session flags and the pending [`Operation`]
//! - [`ServerInfo`]: live match information (map, catalog, filters, score, players)
//! - [`ControlState`]: both of the above, as held by the state manager
//! - [`ControlConfig`]: daemon settings loaded from `srcds-control.yaml`

pub mod config;
pub mod control_state;
pub mod server_info;
pub mod server_state;

pub use config::{
    ControlConfig, HookEvent, LogReceiverSettings, LogTransport, LoggingSettings, MapSettings,
    OfficialMap, RconSettings, ServerSettings, TimeoutSettings, UpdateSettings,
};
pub use control_state::ControlState;
pub use server_info::{
    DEFAULT_MAP_FILTERS, MapDetail, MapFilterType, Player, Score, ServerInfo, ServerInfoView,
    Team, TeamSide,
};
pub use server_state::{Operation, OperationAction, ServerState};
