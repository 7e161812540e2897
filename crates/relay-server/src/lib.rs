//! relay-server library: the relay core and its WebSocket front end.
//!
//! The binary in `main.rs` wires configuration and logging around
//! [`server::RelayServer`].

pub mod config;
pub mod relay;
pub mod server;
pub mod transport;
