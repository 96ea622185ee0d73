//! bridge-server
//!
//! Websocket gateway that lets browser clients script a running Creatures
//! engine over its legacy IPC channel.

pub mod config;
pub mod types;
pub mod origin;
pub mod transport;
pub mod session;
pub mod engine_task;
pub mod registry;
pub mod local_commands;
pub mod gateway;
pub mod client;
pub mod relay;
pub mod poller;
pub mod server;
