//! Server configuration, loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working server on the standard port:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:25565"
//! name = "A classic server"
//! motd = "Welcome!"
//! ping_interval_secs = 5
//!
//! [protocol]
//! required_extensions = 0
//! extensions = [
//!     { name = "ExtEntityPositions", version = 1 },
//!     { name = "TwoWayPing", version = 1 },
//! ]
//!
//! [logging]
//! level = "info"
//! ```

use crate::protocol::{
    capability::{self, Capability, CapabilitySet},
    STRING_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub protocol: ProtocolSettings,
    pub logging: LoggingSettings,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs_err::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("server.name", &self.server.name), ("server.motd", &self.server.motd)] {
            if value.chars().count() > STRING_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "{field} is longer than {STRING_LENGTH} characters"
                )));
            }
        }

        let offered = self.protocol.offered();
        if offered.len() != self.protocol.extensions.len() {
            return Err(ConfigError::Invalid(
                "protocol.extensions lists an extension twice".to_owned(),
            ));
        }
        if offered.len() > usize::from(u16::MAX) {
            return Err(ConfigError::Invalid(
                "protocol.extensions has too many entries".to_owned(),
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level {:?}",
                self.logging.level
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Shown on the loading screen.
    pub name: String,
    pub motd: String,
    /// Seconds between keep-alive pings; 0 disables them.
    pub ping_interval_secs: u64,
}

impl ServerSettings {
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 25565)),
            name: "A classic server".to_owned(),
            motd: "Welcome!".to_owned(),
            ping_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Extensions offered to clients during negotiation.
    pub extensions: Vec<ExtensionSetting>,
    /// Clients that announce fewer extensions than this are disconnected.
    pub required_extensions: usize,
}

impl ProtocolSettings {
    pub fn offered(&self) -> CapabilitySet {
        self.extensions
            .iter()
            .map(|extension| Capability::new(extension.name.clone(), extension.version))
            .collect()
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        let extensions = [
            (capability::CUSTOM_BLOCKS, 1),
            (capability::EXT_ENTITY_POSITIONS, 1),
            (capability::EXTENDED_BLOCKS, 1),
            (capability::FULL_CP437, 1),
            (capability::FAST_MAP, 1),
            (capability::TWO_WAY_PING, 1),
            (capability::PLAYER_CLICK, 1),
        ]
        .into_iter()
        .map(|(name, version)| ExtensionSetting {
            name: name.to_owned(),
            version,
        })
        .collect();
        Self {
            extensions,
            required_extensions: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExtensionSetting {
    pub name: String,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
}

impl LoggingSettings {
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}
