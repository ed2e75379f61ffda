//! Batch installs under a fixed concurrency cap
//!
//! Every declaration becomes one spawned job (resolve, select, fetch,
//! record). A semaphore bounds how many run at once. Jobs never propagate
//! errors to each other: each outcome lands in a shared list behind a
//! mutex, and the only synchronization point is joining every handle.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use super::fetch::{fetch_and_verify, FetchRequest};
use super::lock::{LockAccumulator, LockEntry, PackageLock};
use super::progress::ProgressSink;
use crate::catalog::{ArtifactDeclaration, Catalogs, SourceKind, VersionConstraint};
use crate::error::{MpmError, Result};
use crate::platform::Target;
use crate::resolve::{resolve, FallbackPolicy};

/// Fetches allowed in flight at once
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default plugin directory, relative to the server root
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub plugins_dir: PathBuf,
    /// Re-download files that already exist
    pub force: bool,
    pub max_concurrent: usize,
    pub fallback: FallbackPolicy,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from(DEFAULT_PLUGINS_DIR),
            force: false,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// A plugin that is now on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    /// Lock key (the catalog identifier)
    pub key: String,
    pub name: String,
    pub source: SourceKind,
    pub version: String,
    pub filename: String,
    pub path: PathBuf,
    pub digest: String,
    /// Already present, nothing downloaded
    pub reused: bool,
    /// Catalog platform key the version was matched under
    pub platform_key: Option<String>,
    pub fallback_used: bool,
}

impl InstalledArtifact {
    pub fn lock_entry(&self) -> LockEntry {
        LockEntry {
            name: self.name.clone(),
            version: self.version.clone(),
            hash: self.digest.clone(),
            filename: Some(self.filename.clone()),
        }
    }
}

/// A plugin that could not be installed, and why
#[derive(Debug)]
pub struct ArtifactFailure {
    pub key: String,
    pub name: String,
    pub optional: bool,
    pub error: MpmError,
}

impl ArtifactFailure {
    fn new(declaration: &ArtifactDeclaration, error: MpmError) -> Self {
        Self {
            key: declaration.lock_key().to_string(),
            name: declaration.name.clone(),
            optional: declaration.optional,
            error,
        }
    }
}

/// Aggregate outcome of a batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub installed: Vec<InstalledArtifact>,
    pub failures: Vec<ArtifactFailure>,
    /// Lock entries for every successful artifact
    pub lock: BTreeMap<String, LockEntry>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.installed.len() + self.failures.len()
    }

    /// No required plugin failed; optional ones may have
    pub fn is_success(&self) -> bool {
        self.required_failures().next().is_none()
    }

    pub fn required_failures(&self) -> impl Iterator<Item = &ArtifactFailure> {
        self.failures.iter().filter(|f| !f.optional)
    }

    pub fn integrity_failures(&self) -> impl Iterator<Item = &ArtifactFailure> {
        self.failures.iter().filter(|f| f.error.is_integrity_failure())
    }
}

/// Latest available version versus what the lock file records
#[derive(Debug)]
pub struct UpdateCheck {
    pub name: String,
    pub key: String,
    pub installed: Option<String>,
    pub latest: Result<String>,
}

impl UpdateCheck {
    pub fn has_update(&self) -> bool {
        match &self.latest {
            Ok(latest) => self.installed.as_deref() != Some(latest.as_str()),
            Err(_) => false,
        }
    }
}

/// Runs the resolve-and-fetch pipeline for declared plugins
#[derive(Clone)]
pub struct Installer {
    catalogs: Catalogs,
    target: Target,
    settings: InstallSettings,
    progress: ProgressSink,
}

impl Installer {
    pub fn new(catalogs: Catalogs, target: Target, settings: InstallSettings) -> Self {
        Self {
            catalogs,
            target,
            settings,
            progress: ProgressSink::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &InstallSettings {
        &self.settings
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Resolve and fetch a single plugin
    pub async fn install_one(&self, declaration: &ArtifactDeclaration) -> Result<InstalledArtifact> {
        let job = self.progress.job(declaration.name.clone());
        let source = match self.catalogs.get(declaration.source) {
            Ok(source) => source,
            Err(e) => {
                job.failed(e.to_string());
                return Err(e);
            }
        };

        let resolution =
            match resolve(source.as_ref(), declaration, &self.target, self.settings.fallback).await
            {
                Ok(resolution) => resolution,
                Err(e) => {
                    job.failed(e.to_string());
                    return Err(e);
                }
            };

        let algorithm = source.digest_algorithm();
        let request = FetchRequest {
            url: resolution.file.url.clone(),
            filename: resolution.file.filename.clone(),
            dest_dir: self.settings.plugins_dir.clone(),
            expected_digest: resolution.file.digest(algorithm).map(str::to_string),
            algorithm,
            force: self.settings.force,
        };
        tracing::info!(
            "Downloading {} {} from {}",
            declaration.name,
            resolution.version.label,
            declaration.source
        );
        let outcome = fetch_and_verify(source.as_ref(), &request, &job).await?;

        Ok(InstalledArtifact {
            key: declaration.lock_key().to_string(),
            name: declaration.name.clone(),
            source: declaration.source,
            version: resolution.version.label.clone(),
            filename: request.filename,
            path: outcome.path,
            digest: outcome.digest,
            reused: outcome.reused,
            fallback_used: resolution.fallback_used(),
            platform_key: resolution.platform_key,
        })
    }

    /// Install every declaration, at most `max_concurrent` at a time.
    ///
    /// Individual failures are collected into the report; this never fails
    /// as a whole.
    pub async fn install_all(&self, declarations: &[ArtifactDeclaration]) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let installed = Arc::new(Mutex::new(Vec::<InstalledArtifact>::new()));
        let failures = Arc::new(Mutex::new(Vec::<ArtifactFailure>::new()));
        let lock = LockAccumulator::new();

        tracing::info!(
            "Installing {} plugin(s) for {} {}",
            declarations.len(),
            self.target.platform_label(),
            self.target.game_version.as_deref().unwrap_or("(any version)")
        );

        let handles: Vec<_> = declarations
            .iter()
            .cloned()
            .map(|declaration| {
                let installer = self.clone();
                let semaphore = semaphore.clone();
                let installed = installed.clone();
                let failures = failures.clone();
                let lock = lock.clone();

                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            failures.lock().await.push(ArtifactFailure::new(
                                &declaration,
                                MpmError::TaskFailed(e.to_string()),
                            ));
                            return;
                        }
                    };

                    match installer.install_one(&declaration).await {
                        Ok(artifact) => {
                            lock.record(artifact.key.clone(), artifact.lock_entry()).await;
                            installed.lock().await.push(artifact);
                        }
                        Err(error) => {
                            if error.is_integrity_failure() {
                                tracing::error!("{}: {}", declaration.name, error);
                            } else if declaration.optional {
                                tracing::info!("Skipping optional {}: {}", declaration.name, error);
                            } else {
                                tracing::warn!("Skipping {}: {}", declaration.name, error);
                            }
                            failures
                                .lock()
                                .await
                                .push(ArtifactFailure::new(&declaration, error));
                        }
                    }
                })
            })
            .collect();

        let results = join_all(handles).await;
        for (declaration, result) in declarations.iter().zip(results) {
            if let Err(e) = result {
                failures.lock().await.push(ArtifactFailure::new(
                    declaration,
                    MpmError::TaskFailed(e.to_string()),
                ));
            }
        }

        let mut installed = std::mem::take(&mut *installed.lock().await);
        let mut failures = std::mem::take(&mut *failures.lock().await);
        installed.sort_by(|a, b| a.name.cmp(&b.name));
        failures.sort_by(|a, b| a.name.cmp(&b.name));

        let report = BatchReport {
            installed,
            failures,
            lock: lock.take().await,
        };
        tracing::info!(
            "Batch finished: {} installed, {} failed",
            report.installed.len(),
            report.failures.len()
        );
        report
    }

    /// Compare the newest compatible version of each plugin with the lock
    pub async fn check_updates(
        &self,
        declarations: &[ArtifactDeclaration],
        lock: &PackageLock,
    ) -> Vec<UpdateCheck> {
        let semaphore = Semaphore::new(self.settings.max_concurrent.max(1));

        let checks = declarations.iter().map(|declaration| {
            let semaphore = &semaphore;
            async move {
                let latest = async {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| MpmError::TaskFailed(e.to_string()))?;
                    let source = self.catalogs.get(declaration.source)?;
                    let mut wanted = declaration.clone();
                    wanted.version = VersionConstraint::Latest;
                    let resolution =
                        resolve(source.as_ref(), &wanted, &self.target, self.settings.fallback)
                            .await?;
                    Ok::<_, MpmError>(resolution.version.label)
                }
                .await;

                UpdateCheck {
                    name: declaration.name.clone(),
                    key: declaration.lock_key().to_string(),
                    installed: lock.get(declaration.lock_key()).map(|e| e.version.clone()),
                    latest,
                }
            }
        });

        join_all(checks).await
    }
}
