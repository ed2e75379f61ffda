//! Resolution: from a declaration to one concrete file
//!
//! Versions are filtered one compatibility pass at a time (exact platform
//! key first, then each fallback key in table order) and the first pass
//! that yields a selectable version wins.

use serde::{Deserialize, Serialize};

use crate::catalog::{
    ArtifactDeclaration, CandidateFile, CatalogSource, CatalogVersionEntry, VersionConstraint,
};
use crate::compat::{CompatibilityTable, Verdict};
use crate::error::{MpmError, Result};
use crate::platform::Target;
use crate::select::{select_file, select_version};

/// Whether a build for a compatible-but-different platform may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Use the nearest compatible platform, with a warning
    #[default]
    Automatic,
    /// Fail the artifact instead
    Deny,
}

/// The outcome of resolving one declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub version: CatalogVersionEntry,
    pub file: CandidateFile,
    /// Catalog platform key the version was matched under
    pub platform_key: Option<String>,
    pub exact: bool,
}

impl Resolution {
    pub fn fallback_used(&self) -> bool {
        !self.exact
    }
}

/// List versions from `source` and resolve `declaration` against them
pub async fn resolve(
    source: &dyn CatalogSource,
    declaration: &ArtifactDeclaration,
    target: &Target,
    policy: FallbackPolicy,
) -> Result<Resolution> {
    let versions = source
        .versions(&declaration.identifier, target.game_version.as_deref())
        .await?;
    tracing::debug!(
        "{} lists {} version(s) of {}",
        source.kind(),
        versions.len(),
        declaration.identifier
    );

    resolve_from_versions(
        source.compatibility(),
        declaration,
        target,
        policy,
        &versions,
    )
}

/// Grade one release for the target.
///
/// Only platform builds that run on the target game version count. A
/// release that declares platforms, none of them for that game version,
/// is incompatible even when the target has no platform.
pub fn grade(table: &CompatibilityTable, target: &Target, entry: &CatalogVersionEntry) -> Verdict {
    let game_version = target.game_version.as_deref();
    let keys: Vec<&str> = entry
        .supported_platforms
        .keys()
        .map(String::as_str)
        .filter(|key| entry.supports(key, game_version))
        .collect();

    if keys.is_empty() && !entry.supported_platforms.is_empty() {
        return Verdict::Incompatible;
    }
    table.verdict(target.platform, keys)
}

/// Resolve against an already-fetched, catalog-ordered version list
pub fn resolve_from_versions(
    table: &CompatibilityTable,
    declaration: &ArtifactDeclaration,
    target: &Target,
    policy: FallbackPolicy,
    versions: &[CatalogVersionEntry],
) -> Result<Resolution> {
    let graded: Vec<(Verdict, &CatalogVersionEntry)> = versions
        .iter()
        .map(|entry| (grade(table, target, entry), entry))
        .filter(|(verdict, _)| verdict.is_usable())
        .collect();
    let mut saw_candidates = false;
    let mut found = None;

    for pass in table.passes(target.platform) {
        let filtered: Vec<&CatalogVersionEntry> = graded
            .iter()
            .filter(|(verdict, _)| table.admits(&pass, *verdict))
            .map(|(_, entry)| *entry)
            .collect();
        if filtered.is_empty() {
            continue;
        }
        saw_candidates = true;

        if let Some(entry) = select_version(&filtered, &declaration.version) {
            found = Some((entry, pass));
            break;
        }
    }

    let Some((entry, pass)) = found else {
        return Err(match &declaration.version {
            VersionConstraint::Exact(requested) if saw_candidates => MpmError::VersionNotFound {
                name: declaration.name.clone(),
                requested: requested.clone(),
            },
            _ => MpmError::NoCompatibleVersion {
                name: declaration.name.clone(),
                platform: target.platform_label(),
            },
        });
    };

    if !pass.exact {
        let used = pass.key.unwrap_or("any");
        if policy == FallbackPolicy::Deny {
            return Err(MpmError::FallbackDenied {
                name: declaration.name.clone(),
                requested: target.platform_label(),
                available: used.to_string(),
            });
        }
        tracing::warn!(
            "{}: no {} build of {}, using the {} build instead",
            declaration.name,
            target.platform_label(),
            entry.label,
            used
        );
    }

    let file = select_file(entry, pass.key).ok_or_else(|| MpmError::NoDownloadableFile {
        name: declaration.name.clone(),
        version: entry.label.clone(),
    })?;

    Ok(Resolution {
        version: entry.clone(),
        file: file.clone(),
        platform_key: pass.key.map(str::to_string),
        exact: pass.exact,
    })
}
