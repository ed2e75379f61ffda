//! Server software kinds and the install target

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MpmError;

/// Server software a plugin set is installed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPlatform {
    Paper,
    Purpur,
    Folia,
    Spigot,
    Bukkit,
    Sponge,
    Velocity,
    Waterfall,
}

impl ServerPlatform {
    pub const ALL: [ServerPlatform; 8] = [
        ServerPlatform::Paper,
        ServerPlatform::Purpur,
        ServerPlatform::Folia,
        ServerPlatform::Spigot,
        ServerPlatform::Bukkit,
        ServerPlatform::Sponge,
        ServerPlatform::Velocity,
        ServerPlatform::Waterfall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerPlatform::Paper => "paper",
            ServerPlatform::Purpur => "purpur",
            ServerPlatform::Folia => "folia",
            ServerPlatform::Spigot => "spigot",
            ServerPlatform::Bukkit => "bukkit",
            ServerPlatform::Sponge => "sponge",
            ServerPlatform::Velocity => "velocity",
            ServerPlatform::Waterfall => "waterfall",
        }
    }
}

impl fmt::Display for ServerPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerPlatform {
    type Err = MpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ServerPlatform::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| MpmError::Config(format!("unknown server type: {s}")))
    }
}

/// What the plugins are being installed for.
///
/// `platform: None` means unconstrained: every candidate is an exact match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub platform: Option<ServerPlatform>,
    pub game_version: Option<String>,
}

impl Target {
    pub fn new(platform: Option<ServerPlatform>, game_version: Option<String>) -> Self {
        Self {
            platform,
            game_version: game_version.filter(|v| !v.trim().is_empty()),
        }
    }

    /// Build a target from free-form config strings.
    ///
    /// Unknown server types degrade to "no constraint" with a warning.
    pub fn from_config(server_type: &str, game_version: &str) -> Self {
        let platform = if server_type.trim().is_empty() {
            None
        } else {
            match server_type.parse::<ServerPlatform>() {
                Ok(p) => Some(p),
                Err(_) => {
                    tracing::warn!(
                        "Unknown server type '{}', plugins will not be filtered by platform",
                        server_type
                    );
                    None
                }
            }
        };
        Self::new(platform, Some(game_version.to_string()))
    }

    pub fn platform_label(&self) -> String {
        self.platform
            .map(|p| p.to_string())
            .unwrap_or_else(|| "any".to_string())
    }
}
