//! Hangar v1 client
//!
//! Hangar identifies projects as `owner/slug`, publishes one download per
//! platform, and cannot filter versions by game version. The client pages
//! through the version list and filters on `platformDependencies` itself.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::http::{get_json, open_download, DEFAULT_REQUEST_TIMEOUT};
use super::{
    CandidateFile, CatalogProject, CatalogSource, CatalogVersionEntry, Download, Downloader,
    SourceKind,
};
use crate::compat::{CompatibilityTable, HANGAR};
use crate::error::{MpmError, Result};
use crate::integrity::DigestAlgorithm;
use crate::platform::ServerPlatform;

/// Public Hangar API
pub const HANGAR_BASE_URL: &str = "https://hangar.papermc.io/api/v1";

const PAGE_SIZE: u64 = 25;

/// Upper bound on version pages fetched per lookup
const MAX_VERSION_PAGES: u64 = 8;

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    offset: u64,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    owner: String,
    slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    name: String,
    namespace: Namespace,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    supported_platforms: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Version {
    name: String,
    #[serde(default)]
    downloads: BTreeMap<String, PlatformDownload>,
    #[serde(default)]
    platform_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformDownload {
    #[serde(default)]
    file_info: Option<FileInfo>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    sha256_hash: Option<String>,
}

/// Split a Hangar identifier into `(owner, slug)`
pub fn parse_hangar_id(identifier: &str) -> Result<(&str, &str)> {
    let invalid = |reason: &str| MpmError::InvalidIdentifier {
        source_kind: SourceKind::Hangar.to_string(),
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    };

    let (owner, slug) = identifier
        .trim()
        .split_once('/')
        .ok_or_else(|| invalid("expected owner/slug"))?;

    if owner.is_empty() || slug.is_empty() {
        return Err(invalid("owner and slug must both be non-empty"));
    }
    if slug.contains('/') {
        return Err(invalid("too many path segments"));
    }
    Ok((owner, slug))
}

/// Name the downloaded file: published name, else the URL's last segment
/// when it is a jar, else a synthetic `plugin-<version>.jar`.
fn derive_filename(info: Option<&FileInfo>, url: &str, version: &str) -> String {
    if let Some(name) = info.map(|i| i.name.trim()).filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    let last = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default();
    if last.to_ascii_lowercase().ends_with(".jar") {
        return last.to_string();
    }

    format!("plugin-{version}.jar")
}

impl From<Project> for CatalogProject {
    fn from(project: Project) -> Self {
        let categories = project
            .category
            .into_iter()
            .chain(project.supported_platforms.into_keys())
            .collect();
        CatalogProject {
            display_name: project.name,
            stable_id: format!("{}/{}", project.namespace.owner, project.namespace.slug),
            description: project.description,
            categories,
        }
    }
}

impl From<Version> for CatalogVersionEntry {
    fn from(version: Version) -> Self {
        let mut files = Vec::new();
        for (platform, download) in version.downloads {
            let Some(url) = download
                .download_url
                .or(download.external_url)
                .filter(|u| !u.is_empty())
            else {
                continue;
            };

            let info = download.file_info.as_ref();
            let filename = derive_filename(info, &url, &version.name);
            let mut digests = BTreeMap::new();
            if let Some(hash) = info.and_then(|i| i.sha256_hash.clone()) {
                digests.insert(DigestAlgorithm::Sha256.name().to_string(), hash);
            }

            files.push(CandidateFile {
                url,
                filename,
                digests,
                size: info.map(|i| i.size_bytes).unwrap_or(0),
                primary: files.is_empty(),
                platform: Some(platform),
            });
        }

        CatalogVersionEntry {
            label: version.name,
            supported_platforms: version.platform_dependencies,
            files,
        }
    }
}

/// Hangar catalog client
pub struct HangarClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HangarClient {
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

    async fn version_page(&self, owner: &str, slug: &str, offset: u64) -> Result<Page<Version>> {
        let request = self
            .client
            .get(format!(
                "{}/projects/{}/{}/versions",
                self.base_url, owner, slug
            ))
            .query(&[("limit", PAGE_SIZE), ("offset", offset)]);
        get_json(&self.client, request, self.timeout).await
    }
}

#[async_trait]
impl Downloader for HangarClient {
    async fn download(&self, url: &str) -> Result<Download> {
        open_download(&self.client, url).await
    }
}

#[async_trait]
impl CatalogSource for HangarClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Hangar
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::Sha256
    }

    fn compatibility(&self) -> &'static CompatibilityTable {
        &HANGAR
    }

    async fn search(
        &self,
        query: &str,
        platform: Option<ServerPlatform>,
        strict: bool,
    ) -> Result<Vec<CatalogProject>> {
        let mut params = vec![
            ("q", query.to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("offset", "0".to_string()),
        ];

        if platform.is_some() {
            // Hangar takes a single platform filter; sponge has no key at all
            let keys = HANGAR.search_keys(platform, strict);
            let Some(key) = keys.first() else {
                tracing::debug!(
                    "Hangar has no plugins for {}",
                    platform.map(|p| p.to_string()).unwrap_or_default()
                );
                return Ok(Vec::new());
            };
            params.push(("platform", key.to_string()));
        }

        let request = self
            .client
            .get(format!("{}/projects", self.base_url))
            .query(&params);
        let page: Page<Project> = get_json(&self.client, request, self.timeout).await?;
        tracing::debug!(
            "Hangar search '{}' returned {} of {} projects",
            query,
            page.result.len(),
            page.pagination.count
        );

        Ok(page.result.into_iter().map(Into::into).collect())
    }

    async fn project(&self, identifier: &str) -> Result<CatalogProject> {
        let (owner, slug) = parse_hangar_id(identifier)?;
        let request = self
            .client
            .get(format!("{}/projects/{}/{}", self.base_url, owner, slug));
        let project: Project = get_json(&self.client, request, self.timeout).await?;
        Ok(project.into())
    }

    async fn versions(
        &self,
        identifier: &str,
        game_version: Option<&str>,
    ) -> Result<Vec<CatalogVersionEntry>> {
        let (owner, slug) = parse_hangar_id(identifier)?;
        let mut entries = Vec::new();
        let mut offset = 0;

        for _ in 0..MAX_VERSION_PAGES {
            let page = self.version_page(owner, slug, offset).await?;
            let fetched = page.result.len() as u64;
            entries.extend(page.result.into_iter().map(CatalogVersionEntry::from));

            offset = page.pagination.offset + fetched;
            if fetched == 0 || offset >= page.pagination.count {
                break;
            }
        }

        if let Some(gv) = game_version {
            entries.retain(|entry| entry.supports_game_version(gv));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VERSIONS_PAGE: &str = r#"{
        "pagination": {"limit": 25, "offset": 0, "count": 2},
        "result": [
            {
                "name": "2.11.6",
                "downloads": {
                    "PAPER": {
                        "fileInfo": {"name": "PlaceholderAPI-2.11.6.jar", "sizeBytes": 4096, "sha256Hash": "ABCDEF"},
                        "downloadUrl": "https://hangarcdn.papermc.io/plugins/HelpChat/PlaceholderAPI/versions/2.11.6/PAPER/PlaceholderAPI-2.11.6.jar",
                        "externalUrl": null
                    },
                    "VELOCITY": {
                        "fileInfo": null,
                        "downloadUrl": null,
                        "externalUrl": "https://github.com/example/releases/download/2.11.6/papi-velocity.jar"
                    }
                },
                "platformDependencies": {
                    "PAPER": ["1.20.4", "1.20.6"],
                    "VELOCITY": ["3.3"]
                }
            },
            {
                "name": "2.11.5",
                "downloads": {
                    "PAPER": {
                        "fileInfo": null,
                        "downloadUrl": "https://example.org/download?id=5",
                        "externalUrl": null
                    }
                },
                "platformDependencies": {"PAPER": ["1.19.4"]}
            }
        ]
    }"#;

    fn entries() -> Vec<CatalogVersionEntry> {
        let page: Page<Version> = serde_json::from_str(VERSIONS_PAGE).unwrap();
        page.result.into_iter().map(Into::into).collect()
    }

    #[test]
    fn test_parse_hangar_id() {
        assert_eq!(
            parse_hangar_id("HelpChat/PlaceholderAPI").unwrap(),
            ("HelpChat", "PlaceholderAPI")
        );
        assert!(parse_hangar_id("PlaceholderAPI").is_err());
        assert!(parse_hangar_id("/PlaceholderAPI").is_err());
        assert!(parse_hangar_id("HelpChat/").is_err());
        assert!(matches!(
            parse_hangar_id("a/b/c"),
            Err(MpmError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_one_file_per_platform() {
        let entries = entries();
        let latest = &entries[0];

        assert_eq!(latest.label, "2.11.6");
        assert_eq!(latest.files.len(), 2);

        let paper = &latest.files[0];
        assert_eq!(paper.platform.as_deref(), Some("PAPER"));
        assert_eq!(paper.filename, "PlaceholderAPI-2.11.6.jar");
        assert_eq!(paper.digest(DigestAlgorithm::Sha256), Some("ABCDEF"));
        assert_eq!(paper.size, 4096);
        assert!(paper.primary);

        let velocity = &latest.files[1];
        assert_eq!(velocity.platform.as_deref(), Some("VELOCITY"));
        assert_eq!(velocity.filename, "papi-velocity.jar");
        assert_eq!(velocity.digest(DigestAlgorithm::Sha256), None);
        assert!(!velocity.primary);
    }

    #[test]
    fn test_synthetic_filename() {
        let entries = entries();
        assert_eq!(entries[1].files[0].filename, "plugin-2.11.5.jar");
    }

    #[test]
    fn test_game_version_support_from_dependencies() {
        let entries = entries();
        assert!(entries[0].supports("paper", Some("1.20.4")));
        assert!(entries[0].supports_game_version("1.20.6"));
        assert!(!entries[1].supports_game_version("1.20.4"));
    }

    #[test]
    fn test_project_stable_id_is_owner_slug() {
        let project: Project = serde_json::from_str(
            r#"{
                "name": "PlaceholderAPI",
                "namespace": {"owner": "HelpChat", "slug": "PlaceholderAPI"},
                "description": "Placeholders everywhere",
                "category": "chat",
                "supportedPlatforms": {"PAPER": ["1.20.4"]}
            }"#,
        )
        .unwrap();
        let project: CatalogProject = project.into();

        assert_eq!(project.stable_id, "HelpChat/PlaceholderAPI");
        assert!(project.categories.contains("PAPER"));
        assert!(project.categories.contains("chat"));
    }
}
