//! Picking one version, and one file within it
//!
//! Catalog order is trusted. Labels are not guaranteed to be semantic
//! versions, so nothing here ever sorts.

use crate::catalog::{CandidateFile, CatalogVersionEntry, VersionConstraint};

/// Pick one entry from a filtered, catalog-ordered list.
///
/// "latest" is position 0. A pinned label must match exactly.
pub fn select_version<'a>(
    candidates: &[&'a CatalogVersionEntry],
    constraint: &VersionConstraint,
) -> Option<&'a CatalogVersionEntry> {
    match constraint {
        VersionConstraint::Latest => candidates.first().copied(),
        VersionConstraint::Exact(label) => candidates.iter().copied().find(|e| e.label == *label),
    }
}

/// Pick the file to download.
///
/// Prefers the file built for `platform_key`, then the primary file, then
/// the first listed one.
pub fn select_file<'a>(
    entry: &'a CatalogVersionEntry,
    platform_key: Option<&str>,
) -> Option<&'a CandidateFile> {
    if let Some(key) = platform_key {
        let tagged = entry.files.iter().find(|f| {
            f.platform
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(key))
        });
        if tagged.is_some() {
            return tagged;
        }
    }

    entry
        .files
        .iter()
        .find(|f| f.primary)
        .or_else(|| entry.files.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn version(label: &str) -> CatalogVersionEntry {
        CatalogVersionEntry {
            label: label.to_string(),
            supported_platforms: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    fn file(name: &str, primary: bool, platform: Option<&str>) -> CandidateFile {
        CandidateFile {
            url: format!("https://cdn.example/{name}"),
            filename: name.to_string(),
            digests: BTreeMap::new(),
            size: 0,
            primary,
            platform: platform.map(str::to_string),
        }
    }

    #[test]
    fn test_latest_is_position_zero_never_sorted() {
        let (v3, v1, v2) = (version("3.0.0"), version("1.0.0"), version("2.0.0"));
        let list = [&v3, &v1, &v2];
        let picked = select_version(&list, &VersionConstraint::Latest).unwrap();
        assert_eq!(picked.label, "3.0.0");

        // Source order wins even when it disagrees with semver
        let list = [&v1, &v3, &v2];
        let picked = select_version(&list, &VersionConstraint::Latest).unwrap();
        assert_eq!(picked.label, "1.0.0");
    }

    #[test]
    fn test_pinned_label_exact_match() {
        let (a, b) = (version("5.4.3"), version("5.4.30"));
        let list = [&b, &a];
        let picked =
            select_version(&list, &VersionConstraint::Exact("5.4.3".into())).unwrap();
        assert_eq!(picked.label, "5.4.3");
        assert!(select_version(&list, &VersionConstraint::Exact("5.4".into())).is_none());
    }

    #[test]
    fn test_empty_list() {
        assert!(select_version(&[], &VersionConstraint::Latest).is_none());
    }

    #[test]
    fn test_file_preference() {
        let mut entry = version("1.0");
        entry.files = vec![
            file("sources.jar", false, None),
            file("main.jar", true, None),
        ];
        assert_eq!(select_file(&entry, None).unwrap().filename, "main.jar");

        entry.files = vec![file("a.jar", false, None), file("b.jar", false, None)];
        assert_eq!(select_file(&entry, None).unwrap().filename, "a.jar");

        entry.files = vec![
            file("paper.jar", true, Some("PAPER")),
            file("velocity.jar", false, Some("VELOCITY")),
        ];
        assert_eq!(
            select_file(&entry, Some("velocity")).unwrap().filename,
            "velocity.jar"
        );
        assert_eq!(
            select_file(&entry, Some("WATERFALL")).unwrap().filename,
            "paper.jar"
        );

        entry.files.clear();
        assert!(select_file(&entry, None).is_none());
    }
}
