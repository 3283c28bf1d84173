// srcds-control - control daemon core for a CS2 dedicated server
//
// This is the library crate with the RCON client, log ingestion, process
// supervision and state model. The binary crate (main.rs) wires them together.

pub mod broadcast;
pub mod config;
pub mod controller;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod operations;
pub mod rcon;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use broadcast::{Broadcaster, Envelope, Subscription};
pub use config::ConfigManager;
pub use controller::{ControlError, Controller};
pub use models::{ControlConfig, ControlState, Operation, OperationAction, ServerInfoView};
pub use operations::{OperationEvent, OperationTracker, ProgressEvent};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
