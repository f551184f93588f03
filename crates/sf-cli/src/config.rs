//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use sf_core::GateScope;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the shared state database.
    pub database_path: PathBuf,
    /// Unix socket the daemon listens on.
    pub socket_path: PathBuf,
    /// JSONL file for prompts and completion views no surface was open for.
    pub outbox_path: PathBuf,
    /// Seconds between reconciliation passes that catch lost wakes.
    pub poll_interval_secs: u64,
    /// Session states in which the distraction gate runs.
    pub gate_scope: GateScope,
    /// Gemini model used for the study chat.
    pub gemini_model: String,
    /// Gemini API key. Takes precedence over a key stored with `sf api-key`.
    pub gemini_api_key: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("socket_path", &self.socket_path)
            .field("outbox_path", &self.outbox_path)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("gate_scope", &self.gate_scope)
            .field("gemini_model", &self.gemini_model)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let state_dir = dirs_state_path().unwrap_or_else(|| data_dir.clone());
        Self {
            database_path: data_dir.join("studyfocus.db"),
            socket_path: state_dir.join("daemon.sock"),
            outbox_path: state_dir.join("outbox.jsonl"),
            poll_interval_secs: 15,
            gate_scope: GateScope::default(),
            gemini_model: sf_llm::DEFAULT_MODEL.to_string(),
            gemini_api_key: None,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // SF_DATABASE_PATH, SF_GATE_SCOPE, ...
        figment = figment.merge(Env::prefixed("SF_"));

        figment.extract()
    }

    /// Poll interval, never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Returns the platform-specific config directory for studyfocus.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("studyfocus"))
}

/// Returns the platform-specific data directory for studyfocus.
///
/// On Linux: `~/.local/share/studyfocus`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("studyfocus"))
}

/// Returns the platform-specific state directory for studyfocus.
///
/// On Linux: `~/.local/state/studyfocus`. `None` on platforms without one.
pub fn dirs_state_path() -> Option<PathBuf> {
    dirs::state_dir().map(|p| p.join("studyfocus"))
}
