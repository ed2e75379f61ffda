//! Fetch-and-verify: stream to a staging file while hashing, then publish.
//!
//! The staging file lives in the destination directory so publishing is a
//! same-filesystem rename. Nothing reaches the final path unless the
//! digest matched. When the rename fails the staged bytes are copied over;
//! a failed copy removes the destination rather than leave a partial file.
//!
//! An existing destination is reused only while it matches the published
//! digest (or none is published). A file with the same name but other
//! bytes is downloaded again.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::progress::JobProgress;
use crate::catalog::Downloader;
use crate::error::{MpmError, Result};
use crate::integrity::{digest_file, digests_match, DigestAlgorithm};

/// Prefix for staging files; they are removed on every exit path
pub const STAGING_PREFIX: &str = ".mpm-download-";

/// One file to place on disk
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub filename: String,
    pub dest_dir: PathBuf,
    /// Hex digest published by the catalog. `None` or blank skips the check.
    pub expected_digest: Option<String>,
    pub algorithm: DigestAlgorithm,
    /// Re-download even if the destination exists
    pub force: bool,
}

impl FetchRequest {
    pub fn destination(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }

    fn expected(&self) -> Option<&str> {
        self.expected_digest
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// What ended up on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub path: PathBuf,
    /// Lowercase hex digest of the bytes at `path`
    pub digest: String,
    pub bytes: u64,
    /// The file was already present and no request was made
    pub reused: bool,
}

/// Reject names that are empty or would resolve outside `dest_dir`
pub fn check_filename(filename: &str) -> Result<()> {
    let unsafe_name = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0'])
        || Path::new(filename).is_absolute();
    if unsafe_name {
        return Err(MpmError::UnsafeFilename(filename.to_string()));
    }
    Ok(())
}

/// Download `request.url` into `request.dest_dir`, verifying its digest.
///
/// Progress is reported on `progress` and always ends with a terminal
/// event, including on the idempotent skip path.
pub async fn fetch_and_verify<D>(
    downloader: &D,
    request: &FetchRequest,
    progress: &JobProgress,
) -> Result<FetchOutcome>
where
    D: Downloader + ?Sized,
{
    let result = fetch_inner(downloader, request, progress).await;
    if let Err(e) = &result {
        progress.failed(e.to_string());
    }
    result
}

async fn fetch_inner<D>(
    downloader: &D,
    request: &FetchRequest,
    progress: &JobProgress,
) -> Result<FetchOutcome>
where
    D: Downloader + ?Sized,
{
    check_filename(&request.filename)?;
    let dest = request.destination();
    progress.started(&request.filename);

    if !request.force && is_file(&dest).await {
        if let Some(outcome) = reuse_existing(request, &dest, progress).await? {
            return Ok(outcome);
        }
    }

    tokio::fs::create_dir_all(&request.dest_dir).await?;

    let download = downloader.download(&request.url).await?;
    progress.total(download.length);

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".tmp")
        .tempfile_in(&request.dest_dir)?;
    let (digest, written) = stream_to(&staging, download.body, request.algorithm, progress).await?;

    if download.length.is_none() {
        progress.total(Some(written));
    }

    if let Some(expected) = request.expected() {
        if !digests_match(expected, &digest) {
            tracing::error!(
                "Checksum mismatch for {} from {}: expected {}, got {}",
                request.filename,
                request.url,
                expected,
                digest
            );
            return Err(MpmError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: digest,
                filename: request.filename.clone(),
            });
        }
    } else {
        tracing::debug!("No published digest for {}, skipping check", request.filename);
    }

    publish(staging, &dest).await?;
    progress.finished(false);
    tracing::info!(
        "Installed {} ({} bytes, {} {})",
        dest.display(),
        written,
        request.algorithm,
        digest
    );

    Ok(FetchOutcome {
        path: dest,
        digest,
        bytes: written,
        reused: false,
    })
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Idempotent path: hash what is on disk so the lock matches it.
///
/// `None` when the file differs from the published digest.
async fn reuse_existing(
    request: &FetchRequest,
    dest: &Path,
    progress: &JobProgress,
) -> Result<Option<FetchOutcome>> {
    let bytes = tokio::fs::metadata(dest).await?.len();
    let digest = digest_file(dest, request.algorithm).await?;

    if let Some(expected) = request.expected() {
        if !digests_match(expected, &digest) {
            tracing::warn!(
                "{} differs from the catalog copy, downloading it again",
                dest.display()
            );
            return Ok(None);
        }
    }
    tracing::debug!("{} already present, not downloading", dest.display());

    progress.total(Some(bytes));
    progress.advanced(bytes);
    progress.finished(true);

    Ok(Some(FetchOutcome {
        path: dest.to_path_buf(),
        digest,
        bytes,
        reused: true,
    }))
}

/// Single pass over the body: hash, write, report
async fn stream_to(
    staging: &NamedTempFile,
    mut body: futures::stream::BoxStream<'static, Result<bytes::Bytes>>,
    algorithm: DigestAlgorithm,
    progress: &JobProgress,
) -> Result<(String, u64)> {
    let mut file = tokio::fs::File::from_std(staging.as_file().try_clone()?);
    let mut hasher = algorithm.hasher();
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.advanced(written);
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok((hasher.finalize_hex(), written))
}

/// Move the verified staging file into place
async fn publish(staging: NamedTempFile, dest: &Path) -> Result<()> {
    match staging.persist(dest) {
        Ok(_) => Ok(()),
        Err(err) => {
            tracing::warn!(
                "Rename into {} failed ({}), copying instead",
                dest.display(),
                err.error
            );
            // err.file still owns the staging file and deletes it on drop
            copy_into_place(err.file.path(), dest).await
        }
    }
}

async fn copy_into_place(staged: &Path, dest: &Path) -> Result<()> {
    let mut src = tokio::fs::File::open(staged).await?;
    let mut out = tokio::fs::File::create(dest).await?;

    let copied = async {
        tokio::io::copy(&mut src, &mut out).await?;
        out.flush().await?;
        out.sync_all().await
    }
    .await;

    if let Err(e) = copied {
        drop(out);
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e.into());
    }
    Ok(())
}
