//! Services module - I/O-facing building blocks used by the controller.
//!
//! These have no knowledge of the operation state machine or of each other;
//! [`Controller`](crate::controller::Controller) wires them together.
//!
//! # Components
//!
//! - [`LogParser`]: ordered, first-match-wins classification of server log
//!   lines into [`LogEvent`]s
//! - [`HttpLogReceiver`]: axum listener for `logaddress_add_http` callbacks
//! - [`LogReceiver`]: UDP listener for the server's log-forwarding datagrams
//! - [`MapCatalog`]: Steam Workshop lookups for map titles, previews and tags
//! - [`ProcessHost`]: the seam to the operating system (launch, find, signal,
//!   pseudo-terminal update runs, hook scripts), with [`SystemHost`] as the
//!   real implementation
//! - [`UpdateScraper`]: recognises steamcmd progress milestones

pub mod catalog;
pub mod http_log;
pub mod log_parser;
pub mod log_receiver;
pub mod supervisor;

pub use catalog::{CatalogError, MapCatalog};
pub use http_log::{HttpLogReceiver, log_routes, split_log_body};
pub use log_parser::{LogEvent, LogParser, cut_map_name};
pub use log_receiver::{LogReceiver, LogRecord, parse_datagram};
pub use supervisor::{ProcessHost, SystemHost, UpdateScraper, UpdateSignal};

#[cfg(test)]
pub use supervisor::MockProcessHost;
