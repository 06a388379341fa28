//! Host settings, loaded from TOML.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relay connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// `host:port` of the relay.
    pub addr: String,
}

/// Credentials issued when the game is registered on the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    format!("Trellis {}", env!("CARGO_PKG_VERSION"))
}

fn default_supports() -> Vec<String> {
    ["channels", "games", "players", "tells"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub relay: RelaySettings,
    pub identity: IdentitySettings,
    /// Broadcast channels to subscribe after authentication.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Capability groups declared to the relay.
    #[serde(default = "default_supports")]
    pub supports: Vec<String>,
    /// Stand-in roster for running the reference host without an
    /// embedding game.
    #[serde(default)]
    pub players: Vec<String>,
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading settings");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Default settings location: `<config dir>/trellis.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("chat", "trellis", "trellis").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        Ok(dirs.config_dir().join("trellis.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.relay.addr.is_empty() {
            return Err(Error::InvalidSettings("relay.addr is empty".into()));
        }
        if self.identity.client_id.is_empty() {
            return Err(Error::InvalidSettings("identity.client_id is empty".into()));
        }
        if self.identity.client_secret.is_empty() {
            return Err(Error::InvalidSettings(
                "identity.client_secret is empty".into(),
            ));
        }
        Ok(())
    }
}
