//! Modrinth v2 client
//!
//! Modrinth filters versions by game version server-side and describes
//! platform support through loader categories. Files carry SHA-1 and
//! SHA-512 digests; SHA-512 is the one verified.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::http::{get_json, open_download, DEFAULT_REQUEST_TIMEOUT};
use super::{
    CandidateFile, CatalogProject, CatalogSource, CatalogVersionEntry, Download, Downloader,
    SourceKind,
};
use crate::compat::{CompatibilityTable, MODRINTH};
use crate::error::Result;
use crate::integrity::DigestAlgorithm;
use crate::platform::ServerPlatform;

/// Public Modrinth API
pub const MODRINTH_BASE_URL: &str = "https://api.modrinth.com/v2";

/// Hits requested per search
const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<ProjectHit>,
    #[serde(default)]
    total_hits: u64,
}

#[derive(Debug, Deserialize)]
struct ProjectHit {
    #[serde(default)]
    slug: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    #[serde(default)]
    slug: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Version {
    version_number: String,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    #[serde(default)]
    files: Vec<VersionFile>,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    #[serde(default)]
    hashes: BTreeMap<String, String>,
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    size: u64,
}

impl From<ProjectHit> for CatalogProject {
    fn from(hit: ProjectHit) -> Self {
        let stable_id = if hit.slug.is_empty() {
            hit.project_id
        } else {
            hit.slug
        };
        CatalogProject {
            display_name: hit.title,
            stable_id,
            description: hit.description,
            categories: hit.categories.into_iter().collect(),
        }
    }
}

impl From<Project> for CatalogProject {
    fn from(project: Project) -> Self {
        let stable_id = if project.slug.is_empty() {
            project.id
        } else {
            project.slug
        };
        let categories: BTreeSet<String> = project
            .categories
            .into_iter()
            .chain(project.loaders)
            .collect();
        CatalogProject {
            display_name: project.title,
            stable_id,
            description: project.description,
            categories,
        }
    }
}

impl From<Version> for CatalogVersionEntry {
    fn from(version: Version) -> Self {
        let supported_platforms = version
            .loaders
            .into_iter()
            .map(|loader| (loader, version.game_versions.clone()))
            .collect();

        let files = version
            .files
            .into_iter()
            .map(|f| CandidateFile {
                url: f.url,
                filename: f.filename,
                digests: f.hashes,
                size: f.size,
                primary: f.primary,
                platform: None,
            })
            .collect();

        CatalogVersionEntry {
            label: version.version_number,
            supported_platforms,
            files,
        }
    }
}

/// Search facets: one OR-group of loader categories
fn search_facets(keys: &[&str]) -> String {
    let group: Vec<String> = keys.iter().map(|k| format!("categories:{k}")).collect();
    serde_json::Value::from(vec![group]).to_string()
}

/// Modrinth catalog client
pub struct ModrinthClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ModrinthClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Downloader for ModrinthClient {
    async fn download(&self, url: &str) -> Result<Download> {
        open_download(&self.client, url).await
    }
}

#[async_trait]
impl CatalogSource for ModrinthClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Modrinth
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::Sha512
    }

    fn compatibility(&self) -> &'static CompatibilityTable {
        &MODRINTH
    }

    async fn search(
        &self,
        query: &str,
        platform: Option<ServerPlatform>,
        strict: bool,
    ) -> Result<Vec<CatalogProject>> {
        let keys = MODRINTH.search_keys(platform, strict);
        let facets = search_facets(&keys);
        let limit = SEARCH_LIMIT.to_string();

        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("query", query),
                ("facets", facets.as_str()),
                ("limit", limit.as_str()),
                ("offset", "0"),
            ]);

        let response: SearchResponse = get_json(&self.client, request, self.timeout).await?;
        tracing::debug!(
            "Modrinth search '{}' returned {} of {} hits",
            query,
            response.hits.len(),
            response.total_hits
        );

        Ok(response.hits.into_iter().map(Into::into).collect())
    }

    async fn project(&self, identifier: &str) -> Result<CatalogProject> {
        let request = self
            .client
            .get(format!("{}/project/{}", self.base_url, identifier));
        let project: Project = get_json(&self.client, request, self.timeout).await?;
        Ok(project.into())
    }

    async fn versions(
        &self,
        identifier: &str,
        game_version: Option<&str>,
    ) -> Result<Vec<CatalogVersionEntry>> {
        let mut request = self
            .client
            .get(format!("{}/project/{}/version", self.base_url, identifier));

        if let Some(gv) = game_version {
            let filter = serde_json::Value::from(vec![gv]).to_string();
            request = request.query(&[("game_versions", filter)]);
        }

        let versions: Vec<Version> = get_json(&self.client, request, self.timeout).await?;
        Ok(versions.into_iter().map(Into::into).collect())
    }
}
