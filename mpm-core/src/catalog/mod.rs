//! Plugin catalogs - search, metadata, and version listing
//!
//! Every backing service (Modrinth, Hangar) is normalized into the same
//! shapes so that resolution, fetching, and batching never branch on the
//! concrete source.
//!
//! # Architecture
//!
//! ```text
//! CatalogSource (trait)
//!     ├── ModrinthClient   ← api.modrinth.com/v2, SHA-512
//!     └── HangarClient     ← hangar.papermc.io/api/v1, SHA-256
//!            │
//!            ▼
//!     CatalogProject / CatalogVersionEntry / CandidateFile
//!            │
//!            ▼
//!     compat → select → resolve → install
//! ```

mod hangar;
pub(crate) mod http;
mod modrinth;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::compat::CompatibilityTable;
use crate::error::{MpmError, Result};
use crate::integrity::DigestAlgorithm;
use crate::platform::ServerPlatform;

pub use hangar::{parse_hangar_id, HangarClient, HANGAR_BASE_URL};
pub use http::{build_client, ClientConfig, HttpDownloader};
pub use modrinth::{ModrinthClient, MODRINTH_BASE_URL};

/// Which catalog a plugin comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Modrinth,
    Hangar,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Modrinth, SourceKind::Hangar];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Modrinth => "modrinth",
            SourceKind::Hangar => "hangar",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = MpmError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modrinth" => Ok(SourceKind::Modrinth),
            "hangar" => Ok(SourceKind::Hangar),
            other => Err(MpmError::Config(format!("unknown plugin source: {other}"))),
        }
    }
}

/// Requested version of a declared plugin
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionConstraint {
    #[default]
    Latest,
    Exact(String),
}

impl VersionConstraint {
    /// Empty strings and "latest" (any case) both mean latest
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
            VersionConstraint::Latest
        } else {
            VersionConstraint::Exact(trimmed.to_string())
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, VersionConstraint::Latest)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Latest => f.write_str("latest"),
            VersionConstraint::Exact(label) => f.write_str(label),
        }
    }
}

/// A request to have one plugin present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDeclaration {
    pub name: String,
    pub source: SourceKind,
    /// Source-specific id: a Modrinth slug/id or a Hangar `owner/slug`
    pub identifier: String,
    pub version: VersionConstraint,
    /// A failure is reported but does not fail the batch
    pub optional: bool,
}

impl ArtifactDeclaration {
    pub fn new(
        name: impl Into<String>,
        source: SourceKind,
        identifier: impl Into<String>,
        version: VersionConstraint,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            identifier: identifier.into(),
            version,
            optional: false,
        }
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Stable key used in the lock file
    pub fn lock_key(&self) -> &str {
        &self.identifier
    }
}

/// Discoverable plugin metadata (transient, never persisted)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProject {
    pub display_name: String,
    pub stable_id: String,
    pub description: String,
    pub categories: BTreeSet<String>,
}

/// One published release of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogVersionEntry {
    pub label: String,
    /// Platform key -> game versions that platform build supports
    pub supported_platforms: BTreeMap<String, Vec<String>>,
    pub files: Vec<CandidateFile>,
}

impl CatalogVersionEntry {
    /// Whether this release ships for `platform_key` (case-insensitive),
    /// optionally on a specific game version.
    pub fn supports(&self, platform_key: &str, game_version: Option<&str>) -> bool {
        self.supported_platforms.iter().any(|(key, versions)| {
            key.eq_ignore_ascii_case(platform_key)
                && match game_version {
                    Some(gv) if !versions.is_empty() => versions.iter().any(|v| v == gv),
                    _ => true,
                }
        })
    }

    /// Whether any platform build supports `game_version`
    pub fn supports_game_version(&self, game_version: &str) -> bool {
        self.supported_platforms
            .values()
            .any(|versions| versions.is_empty() || versions.iter().any(|v| v == game_version))
    }
}

/// A downloadable file within a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub url: String,
    pub filename: String,
    /// Algorithm name (`sha256`, `sha512`, ...) -> hex digest
    pub digests: BTreeMap<String, String>,
    /// Zero when unknown
    pub size: u64,
    pub primary: bool,
    /// Platform this file is built for, when the catalog ships one per platform
    pub platform: Option<String>,
}

impl CandidateFile {
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.digests
            .get(algorithm.name())
            .map(String::as_str)
            .filter(|d| !d.trim().is_empty())
    }
}

/// An open download: declared length (if any) plus the body stream
pub struct Download {
    pub length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Opens remote files as byte streams
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Start a download. Non-success statuses surface as [`MpmError::Catalog`].
    async fn download(&self, url: &str) -> Result<Download>;
}

/// A plugin catalog normalized to the common shapes.
///
/// The resolution pipeline is written only against this trait.
#[async_trait]
pub trait CatalogSource: Downloader {
    fn kind(&self) -> SourceKind;

    /// Hash function this catalog publishes for its files
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// Platform lineage in this catalog's vocabulary
    fn compatibility(&self) -> &'static CompatibilityTable;

    /// Search projects. `strict` limits results to the platform's exact key.
    async fn search(
        &self,
        query: &str,
        platform: Option<ServerPlatform>,
        strict: bool,
    ) -> Result<Vec<CatalogProject>>;

    /// Look up one project by its stable identifier
    async fn project(&self, identifier: &str) -> Result<CatalogProject>;

    /// List releases newest-first, limited to `game_version` when given
    async fn versions(
        &self,
        identifier: &str,
        game_version: Option<&str>,
    ) -> Result<Vec<CatalogVersionEntry>>;
}

/// The set of enabled catalogs, keyed by kind
#[derive(Clone, Default)]
pub struct Catalogs {
    sources: HashMap<SourceKind, Arc<dyn CatalogSource>>,
}

impl Catalogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both public catalogs over HTTP
    pub fn http(config: &ClientConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self::new()
            .with_source(Arc::new(
                ModrinthClient::new(client.clone(), &config.modrinth_base_url)
                    .with_timeout(config.request_timeout),
            ))
            .with_source(Arc::new(
                HangarClient::new(client, &config.hangar_base_url)
                    .with_timeout(config.request_timeout),
            )))
    }

    pub fn with_source(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    /// Keep only the given kinds
    pub fn restrict_to(mut self, kinds: &[SourceKind]) -> Self {
        self.sources.retain(|kind, _| kinds.contains(kind));
        self
    }

    pub fn get(&self, kind: SourceKind) -> Result<Arc<dyn CatalogSource>> {
        self.sources
            .get(&kind)
            .cloned()
            .ok_or_else(|| MpmError::SourceUnavailable(kind.to_string()))
    }

    /// Enabled kinds in a stable order
    pub fn kinds(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|k| self.sources.contains_key(k))
            .collect()
    }
}
