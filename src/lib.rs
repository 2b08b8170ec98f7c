//! Companion dashboard for a remote host: one WebSocket connection that mirrors
//! the host's media, volume, brightness, Bluetooth and Wi-Fi state into an
//! observable store, plus the commands that control it.

pub mod command;
pub mod config;
pub mod connection;
pub mod intent;
pub mod protocol;
pub mod rest;
pub mod scheduler;
pub mod state;
pub mod transport;
pub mod types;
