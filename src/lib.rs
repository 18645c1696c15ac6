//! Contact sentry library.
//!
//! Keeps a set of WebSocket observers in sync with a single binary contact
//! sensor. A background poller samples the line and broadcasts NOTIFY
//! messages on armed transitions; clients arm, disarm, enable and disable
//! monitoring and receive REPLY messages with the current configuration.

pub mod config;
pub mod error;
pub mod hub;
pub mod instance_lock;
pub mod poller;
pub mod protocol;
pub mod sensors;
pub mod server;
pub mod state;
