//! CLI subcommand implementations.
//!
//! Every command except `daemon`, `api-key`, and the read-only fallbacks goes
//! through the running daemon, which is the only writer of session state.

pub mod api_key;
pub mod ask;
pub mod classify;
pub mod domains;
pub mod gating;
pub mod session;
pub mod settings;
pub mod status;
pub mod tab;
pub mod util;
pub mod watch;
