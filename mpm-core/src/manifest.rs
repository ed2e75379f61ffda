//! Project manifest (package.yml)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::{ArtifactDeclaration, SourceKind, VersionConstraint};
use crate::error::Result;
use crate::install::InstalledArtifact;
use crate::platform::Target;

/// Default manifest file name
pub const PACKAGE_FILE: &str = "package.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// paper, purpur, folia, spigot, bukkit, sponge, velocity, waterfall
    #[serde(rename = "type", default)]
    pub server_type: String,
    #[serde(default)]
    pub minecraft_version: String,
    /// "latest" or a build number
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build: String,
}

/// A declared plugin. Exactly one of the ids should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    /// "latest" or an exact version label
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modrinth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hangar_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

fn non_empty(id: &Option<String>) -> Option<&str> {
    id.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl PluginSpec {
    /// Catalog and identifier, Modrinth winning when both are set
    pub fn source(&self) -> Option<(SourceKind, &str)> {
        non_empty(&self.modrinth_id)
            .map(|id| (SourceKind::Modrinth, id))
            .or_else(|| non_empty(&self.hangar_id).map(|id| (SourceKind::Hangar, id)))
    }

    pub fn declaration(&self) -> Option<ArtifactDeclaration> {
        let (source, identifier) = self.source()?;
        Some(ArtifactDeclaration::new(
            self.name.clone(),
            source,
            identifier,
            VersionConstraint::parse(&self.version),
        )
        .with_optional(self.optional))
    }

    fn matches(&self, source: SourceKind, identifier: &str) -> bool {
        self.source() == Some((source, identifier))
    }
}

impl Package {
    /// Starter manifest written by `mpm init`
    pub fn template() -> Self {
        Self {
            name: "my-minecraft-server".to_string(),
            version: "1.0.0".to_string(),
            server: ServerConfig {
                server_type: "paper".to_string(),
                minecraft_version: "1.20.4".to_string(),
                build: "latest".to_string(),
            },
            plugins: Vec::new(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml_ng::to_string(self)?)?;
        Ok(())
    }

    pub fn target(&self) -> Target {
        Target::from_config(&self.server.server_type, &self.server.minecraft_version)
    }

    /// Declarations for every plugin that names a catalog
    pub fn declarations(&self) -> Vec<ArtifactDeclaration> {
        self.plugins
            .iter()
            .filter_map(|plugin| {
                let decl = plugin.declaration();
                if decl.is_none() {
                    tracing::warn!("Plugin '{}' has no modrinth_id or hangar_id, skipping", plugin.name);
                }
                decl
            })
            .collect()
    }

    /// Record what an install resolved to, adding the plugin if it is new
    pub fn apply_installed(&mut self, artifact: &InstalledArtifact) {
        let existing = self
            .plugins
            .iter_mut()
            .find(|p| p.matches(artifact.source, &artifact.key));

        match existing {
            Some(plugin) => {
                plugin.name = artifact.name.clone();
                plugin.version = artifact.version.clone();
            }
            None => {
                let mut plugin = PluginSpec {
                    name: artifact.name.clone(),
                    version: artifact.version.clone(),
                    ..Default::default()
                };
                match artifact.source {
                    SourceKind::Modrinth => plugin.modrinth_id = Some(artifact.key.clone()),
                    SourceKind::Hangar => plugin.hangar_id = Some(artifact.key.clone()),
                }
                self.plugins.push(plugin);
            }
        }
    }

    /// Remove a plugin by name (case-insensitive) or identifier
    pub fn remove_plugin(&mut self, name_or_id: &str) -> Option<PluginSpec> {
        let index = self.plugins.iter().position(|p| {
            p.name.eq_ignore_ascii_case(name_or_id)
                || p.source().is_some_and(|(_, id)| id == name_or_id)
        })?;
        Some(self.plugins.remove(index))
    }

    pub fn find_plugin(&self, name_or_id: &str) -> Option<&PluginSpec> {
        self.plugins.iter().find(|p| {
            p.name.eq_ignore_ascii_case(name_or_id)
                || p.source().is_some_and(|(_, id)| id == name_or_id)
        })
    }
}
