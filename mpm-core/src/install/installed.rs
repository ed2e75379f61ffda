//! Finding and checking plugins already on disk
//!
//! The lock entry's recorded filename is authoritative. Without one we fall
//! back to a name heuristic, which can both miss files and match the wrong
//! one (`Essentials` also matches `EssentialsChat-2.20.jar`).

use std::path::{Path, PathBuf};

use super::lock::{LockEntry, PackageLock};
use crate::catalog::ArtifactDeclaration;
use crate::error::Result;
use crate::integrity::{digest_file, digests_match, DigestAlgorithm};

/// Lowercase, keep `[a-z0-9 _-]`, turn spaces into dashes
pub fn normalize_plugin_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .map(|c| if c == ' ' { '-' } else { c.to_ascii_lowercase() })
        .collect()
}

fn is_jar(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
}

/// Heuristic lookup: first jar whose normalized name starts with the
/// normalized plugin name, in directory-name order.
pub fn find_by_name(plugins_dir: &Path, name: &str) -> Option<PathBuf> {
    let wanted = normalize_plugin_name(name);
    if wanted.is_empty() {
        return None;
    }

    let mut matches: Vec<PathBuf> = std::fs::read_dir(plugins_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_jar(path))
        .filter(|path| {
            path.file_name()
                .map(|f| normalize_plugin_name(&f.to_string_lossy()).starts_with(&wanted))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Locate the installed file for a plugin
pub fn find_installed_file(
    plugins_dir: &Path,
    name: &str,
    lock_entry: Option<&LockEntry>,
) -> Option<PathBuf> {
    if let Some(filename) = lock_entry.and_then(|e| e.filename.as_deref()) {
        let path = plugins_dir.join(filename);
        if path.is_file() {
            return Some(path);
        }
        tracing::debug!(
            "Locked file {} for {} is missing, searching by name",
            path.display(),
            name
        );
    }
    find_by_name(plugins_dir, name)
}

/// Result of checking one declared plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Present and matching the lock digest
    Ok,
    /// No file found
    Missing,
    /// Present but never recorded in the lock file
    Unlocked,
    /// Present but the bytes do not match the locked digest
    Modified { expected: String, actual: String },
    /// The locked digest has an unrecognized length
    UnknownDigest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub name: String,
    pub key: String,
    pub path: Option<PathBuf>,
    pub status: ValidationStatus,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.status == ValidationStatus::Ok
    }
}

/// Check every declaration against disk and the lock
pub async fn validate(
    plugins_dir: &Path,
    declarations: &[ArtifactDeclaration],
    lock: &PackageLock,
) -> Result<Vec<ValidationReport>> {
    let mut reports = Vec::with_capacity(declarations.len());

    for decl in declarations {
        let entry = lock.get(decl.lock_key());
        let path = find_installed_file(plugins_dir, &decl.name, entry);

        let status = match (&path, entry) {
            (None, _) => ValidationStatus::Missing,
            (Some(_), None) => ValidationStatus::Unlocked,
            (Some(path), Some(entry)) => match DigestAlgorithm::from_hex_len(&entry.hash) {
                None => ValidationStatus::UnknownDigest,
                Some(algorithm) => {
                    let actual = digest_file(path, algorithm).await?;
                    if digests_match(&entry.hash, &actual) {
                        ValidationStatus::Ok
                    } else {
                        ValidationStatus::Modified {
                            expected: entry.hash.clone(),
                            actual,
                        }
                    }
                }
            },
        };

        if status != ValidationStatus::Ok {
            tracing::warn!("{}: {:?}", decl.name, status);
        }
        reports.push(ValidationReport {
            name: decl.name.clone(),
            key: decl.lock_key().to_string(),
            path,
            status,
        });
    }

    Ok(reports)
}
