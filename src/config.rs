//! Participant client configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration. `CHAIN_SERVER_URL` overrides the
//! server address, and CLI flags are applied on top by the binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ChainError;

pub const SERVER_URL_ENV: &str = "CHAIN_SERVER_URL";

/// Where the experiment server lives and how patient to be with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the experiment server (e.g. `http://localhost:5000`).
    pub base_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            connect_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Fixed delays for every timed loop in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between quorum/readiness polls in the waiting room.
    pub quorum_poll_ms: u64,
    /// Delay between the end of one transmission poll and the next.
    pub transmission_poll_ms: u64,
    /// How long each stimulus word stays on screen.
    pub word_reveal_ms: u64,
    /// Length of the filler task interstitial.
    pub filler_ms: u64,
    /// Leave the chat automatically after this long. `None` waits for the participant.
    pub chat_timeout_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            quorum_poll_ms: 1_000,
            transmission_poll_ms: 1_000,
            word_reveal_ms: 2_000,
            filler_ms: 30_000,
            chat_timeout_ms: None,
        }
    }
}

impl TimingConfig {
    pub fn quorum_poll(&self) -> Duration {
        Duration::from_millis(self.quorum_poll_ms)
    }

    pub fn transmission_poll(&self) -> Duration {
        Duration::from_millis(self.transmission_poll_ms)
    }

    pub fn word_reveal(&self) -> Duration {
        Duration::from_millis(self.word_reveal_ms)
    }

    pub fn filler(&self) -> Duration {
        Duration::from_millis(self.filler_ms)
    }

    pub fn chat_timeout(&self) -> Option<Duration> {
        self.chat_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    pub server: ServerConfig,
    pub timing: TimingConfig,
    /// JSON file backing the local store.
    pub store_path: PathBuf,
    /// Questionnaire answers, submitted as one response at the end.
    pub questionnaire: BTreeMap<String, String>,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            timing: TimingConfig::default(),
            store_path: PathBuf::from(".chain-participant/store.json"),
            questionnaire: BTreeMap::new(),
        }
    }
}

impl ParticipantConfig {
    /// Load from `path` (if any), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ChainError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ChainError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                let config = Self::from_toml_str(&text)?;
                info!(path = %path.display(), "loaded configuration");
                config
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ChainError> {
        toml::from_str(text).map_err(|e| ChainError::Config(e.to_string()))
    }

    fn apply_env(&mut self) {
        match std::env::var(SERVER_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => {
                info!("{SERVER_URL_ENV} set, using server {url}");
                self.server.base_url = url.trim().to_string();
            }
            Ok(_) => warn!("{SERVER_URL_ENV} is empty, ignoring"),
            Err(_) => {}
        }
    }
}
