//! Shared fixtures for integration tests
//!
//! `StubCatalog` is an in-memory catalog whose downloads are instrumented:
//! every open body stream counts as one connection in flight until the
//! stream is dropped.

#![allow(dead_code)]

pub mod responder;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mpm_core::catalog::{
    CandidateFile, CatalogProject, CatalogSource, CatalogVersionEntry, Download, Downloader,
    SourceKind,
};
use mpm_core::compat::{CompatibilityTable, MODRINTH};
use mpm_core::integrity::DigestAlgorithm;
use mpm_core::platform::ServerPlatform;
use mpm_core::{MpmError, Result};
use sha2::{Digest, Sha512};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn sha512_hex(content: &[u8]) -> String {
    hex::encode(Sha512::digest(content))
}

/// Open-stream counter with a high-water mark
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    fn enter(self: &Arc<Self>) -> InFlight {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        InFlight(self.clone())
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<Gauge>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory catalog speaking the Modrinth vocabulary with SHA-512 digests
pub struct StubCatalog {
    kind: SourceKind,
    versions: HashMap<String, Vec<CatalogVersionEntry>>,
    categories: HashMap<String, BTreeSet<String>>,
    failures: HashMap<String, u16>,
    blobs: HashMap<String, Vec<u8>>,
    chunk_delay: Duration,
    pub gauge: Arc<Gauge>,
    downloads: AtomicUsize,
}

impl StubCatalog {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            versions: HashMap::new(),
            categories: HashMap::new(),
            failures: HashMap::new(),
            blobs: HashMap::new(),
            chunk_delay: Duration::from_millis(0),
            gauge: Arc::new(Gauge::default()),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Serve `content` at a URL without listing it in any version
    pub fn with_blob(mut self, url: &str, content: &[u8]) -> Self {
        self.blobs.insert(url.to_string(), content.to_vec());
        self
    }

    /// Publish one version of `identifier` for `platforms`, newest-first
    /// in insertion order. `digest` overrides the published SHA-512.
    pub fn with_version(
        self,
        identifier: &str,
        label: &str,
        platforms: &[&str],
        content: &[u8],
        digest: Option<&str>,
    ) -> Self {
        let filename = format!("{}-{}.jar", identifier.replace('/', "_"), label);
        self.with_file(identifier, label, &filename, platforms, content, digest)
    }

    /// Like [`StubCatalog::with_version`] with an explicit filename, for
    /// plugins that ship every release under the same name
    pub fn with_file(
        mut self,
        identifier: &str,
        label: &str,
        filename: &str,
        platforms: &[&str],
        content: &[u8],
        digest: Option<&str>,
    ) -> Self {
        let filename = filename.to_string();
        let url = format!("https://cdn.stub/{identifier}/{label}/{filename}");
        let published = digest
            .map(str::to_string)
            .unwrap_or_else(|| sha512_hex(content));

        let entry = CatalogVersionEntry {
            label: label.to_string(),
            supported_platforms: platforms
                .iter()
                .map(|p| (p.to_string(), vec!["1.20.4".to_string()]))
                .collect(),
            files: vec![CandidateFile {
                url: url.clone(),
                filename,
                digests: BTreeMap::from([("sha512".to_string(), published)]),
                size: content.len() as u64,
                primary: true,
                platform: None,
            }],
        };

        self.versions
            .entry(identifier.to_string())
            .or_default()
            .push(entry);
        self.blobs.insert(url, content.to_vec());
        self
    }

    /// Platform categories the project advertises in search results
    pub fn with_categories(mut self, identifier: &str, categories: &[&str]) -> Self {
        self.categories.insert(
            identifier.to_string(),
            categories.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Make version listing for `identifier` fail with `status`
    pub fn with_failure(mut self, identifier: &str, status: u16) -> Self {
        self.failures.insert(identifier.to_string(), status);
        self
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for StubCatalog {
    async fn download(&self, url: &str) -> Result<Download> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let content = self.blobs.get(url).cloned().ok_or_else(|| MpmError::Catalog {
            status: 404,
            body: "no such file".to_string(),
            url: url.to_string(),
        })?;

        let guard = self.gauge.enter();
        let length = Some(content.len() as u64);
        let chunk_size = content.len().div_ceil(4).max(1);
        let chunks: Vec<Vec<u8>> = content.chunks(chunk_size).map(<[u8]>::to_vec).collect();
        let delay = self.chunk_delay;

        let body = futures::stream::unfold(
            (chunks.into_iter(), guard),
            move |(mut chunks, guard)| async move {
                let chunk = chunks.next()?;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Some((Ok(Bytes::from(chunk)), (chunks, guard)))
            },
        )
        .boxed();

        Ok(Download { length, body })
    }
}

#[async_trait]
impl CatalogSource for StubCatalog {
    fn kind(&self) -> SourceKind {
        self.kind
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
        _platform: Option<ServerPlatform>,
        _strict: bool,
    ) -> Result<Vec<CatalogProject>> {
        Ok(self
            .versions
            .keys()
            .filter(|id| id.contains(query))
            .map(|id| CatalogProject {
                display_name: id.clone(),
                stable_id: id.clone(),
                description: String::new(),
                categories: self.categories.get(id).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn project(&self, identifier: &str) -> Result<CatalogProject> {
        self.search(identifier, None, false)
            .await?
            .into_iter()
            .find(|p| p.stable_id == identifier)
            .ok_or_else(|| MpmError::Catalog {
                status: 404,
                body: "project not found".to_string(),
                url: identifier.to_string(),
            })
    }

    async fn versions(
        &self,
        identifier: &str,
        game_version: Option<&str>,
    ) -> Result<Vec<CatalogVersionEntry>> {
        if let Some(status) = self.failures.get(identifier) {
            return Err(MpmError::Catalog {
                status: *status,
                body: "upstream unavailable".to_string(),
                url: format!("https://api.stub/project/{identifier}/version"),
            });
        }

        let mut versions = self.versions.get(identifier).cloned().unwrap_or_default();
        if let Some(gv) = game_version {
            versions.retain(|v| v.supports_game_version(gv));
        }
        Ok(versions)
    }
}

/// Names of leftover staging files in `dir`
pub fn staging_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(mpm_core::install::fetch::STAGING_PREFIX))
                .collect()
        })
        .unwrap_or_default()
}
