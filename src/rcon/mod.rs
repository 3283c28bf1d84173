//! Source RCON protocol support.
//!
//! - [`packet`]: wire codec and stream framing
//! - [`RconClient`]: one authenticated TCP session
//! - [`CommandQueue`]: FIFO that keeps a single command in flight

pub mod client;
pub mod packet;
pub mod queue;

pub use client::{RconClient, RconOptions};
pub use packet::{Packet, PacketError};
pub use queue::{CommandQueue, QueueError};

use std::time::Duration;
use thiserror::Error;

/// Errors raised by [`RconClient`]
#[derive(Error, Debug)]
pub enum RconError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("Unable to authenticate")]
    Auth,

    #[error("Already authenticated")]
    AlreadyAuthenticated,

    #[error("Already disconnected. Please reauthenticate.")]
    NotConnected,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Unable to write to socket: {0}")]
    Write(std::io::Error),

    #[error("Connection closed by server")]
    Closed,

    #[error(transparent)]
    Packet(#[from] PacketError),
}
