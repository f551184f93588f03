//! Study focus CLI library.
//!
//! Holds the daemon that owns the session plus the client commands that talk
//! to it over a Unix socket.

mod cli;
pub mod client;
pub mod commands;
mod config;
pub mod daemon;
pub mod outbox;

pub use cli::{ClassifyAction, Cli, Commands, DomainsAction, GatingArgs, SettingsArgs, StartArgs};
pub use config::Config;
