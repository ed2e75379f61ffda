//! Finding a plugin by free-text name across every enabled catalog
//!
//! Each catalog is searched with the platform's exact key first and, when
//! that finds nothing, again with its fallback keys. Hits are ranked by edit
//! distance between the query and the display name.

use futures::future::join_all;

use crate::catalog::{ArtifactDeclaration, CatalogProject, Catalogs, SourceKind, VersionConstraint};
use crate::compat::Verdict;
use crate::error::Result;
use crate::platform::ServerPlatform;

/// How many near matches are offered when nothing matches exactly
pub const SUGGESTION_LIMIT: usize = 6;

/// Case-insensitive Levenshtein distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub source: SourceKind,
    pub project: CatalogProject,
    pub distance: usize,
    /// Found only through a fallback platform
    pub fallback: bool,
}

impl SearchHit {
    /// Declaration for installing the latest compatible version
    pub fn declaration(&self) -> ArtifactDeclaration {
        ArtifactDeclaration::new(
            self.project.display_name.clone(),
            self.source,
            self.project.stable_id.clone(),
            VersionConstraint::Latest,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A display name equal to the query (ignoring case)
    Exact(SearchHit),
    /// Closest hits, best first, at most [`SUGGESTION_LIMIT`]
    Suggestions(Vec<SearchHit>),
    NoMatches,
}

/// Search every catalog and rank the combined hits.
///
/// A failing catalog is logged and skipped so that an outage is not
/// mistaken for "no such plugin".
pub async fn search_catalogs(
    catalogs: &Catalogs,
    query: &str,
    platform: Option<ServerPlatform>,
) -> Vec<SearchHit> {
    let searches = catalogs.kinds().into_iter().map(|kind| async move {
        let source = match catalogs.get(kind) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("{}", e);
                return Vec::new();
            }
        };

        let mut widened = false;
        let mut projects = match source.search(query, platform, true).await {
            Ok(projects) => projects,
            Err(e) => {
                tracing::warn!("{} search failed: {}", kind, e);
                return Vec::new();
            }
        };

        if projects.is_empty() && platform.is_some() {
            tracing::debug!("No exact-platform hits on {}, widening to fallbacks", kind);
            widened = true;
            projects = source.search(query, platform, false).await.unwrap_or_else(|e| {
                tracing::warn!("{} search failed: {}", kind, e);
                Vec::new()
            });
        }

        let table = source.compatibility();
        projects
            .into_iter()
            .map(|project| {
                let verdict = table.verdict(platform, project.categories.iter().map(String::as_str));
                SearchHit {
                    source: kind,
                    distance: levenshtein(query, &project.display_name),
                    fallback: match verdict {
                        Verdict::Exact => false,
                        Verdict::Fallback(_) => true,
                        // categories do not always list platforms
                        Verdict::Incompatible => widened,
                    },
                    project,
                }
            })
            .collect::<Vec<_>>()
    });

    let mut hits: Vec<SearchHit> = join_all(searches).await.into_iter().flatten().collect();
    hits.sort_by_key(|hit| hit.distance);
    hits
}

/// `modrinth:<id>` or `hangar:<owner/slug>` names a project directly
pub fn parse_source_ref(query: &str) -> Option<(SourceKind, &str)> {
    let (prefix, identifier) = query.split_once(':')?;
    let kind = prefix.parse::<SourceKind>().ok()?;
    let identifier = identifier.trim();
    (!identifier.is_empty()).then_some((kind, identifier))
}

/// Fetch one project by its catalog identifier, bypassing search.
///
/// Fails with the catalog's error when the identifier does not exist.
pub async fn lookup_project(
    catalogs: &Catalogs,
    kind: SourceKind,
    identifier: &str,
) -> Result<SearchHit> {
    let source = catalogs.get(kind)?;
    let project = source.project(identifier).await?;
    tracing::debug!("{} resolved {} to {}", kind, identifier, project.display_name);
    Ok(SearchHit {
        source: kind,
        project,
        distance: 0,
        fallback: false,
    })
}

/// Auto-pick an exact name match, otherwise offer the closest hits
pub fn rank(mut hits: Vec<SearchHit>) -> SearchOutcome {
    hits.sort_by_key(|hit| hit.distance);
    if hits.is_empty() {
        return SearchOutcome::NoMatches;
    }
    if hits[0].distance == 0 {
        return SearchOutcome::Exact(hits.swap_remove(0));
    }
    hits.truncate(SUGGESTION_LIMIT);
    SearchOutcome::Suggestions(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn hit(name: &str, query: &str) -> SearchHit {
        SearchHit {
            source: SourceKind::Modrinth,
            project: CatalogProject {
                display_name: name.to_string(),
                stable_id: name.to_lowercase(),
                description: String::new(),
                categories: BTreeSet::new(),
            },
            distance: levenshtein(query, name),
            fallback: false,
        }
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("LuckPerms", "luckperms"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("worldedit", "WorldEdit"), 0);
        assert_eq!(levenshtein("essentials", "EssentialsX"), 1);
    }

    #[test]
    fn test_rank_exact_match() {
        let hits = vec![hit("LuckPerms Addon", "luckperms"), hit("LuckPerms", "luckperms")];
        match rank(hits) {
            SearchOutcome::Exact(h) => assert_eq!(h.project.display_name, "LuckPerms"),
            other => panic!("expected exact match, got {other:?}"),
        }
    }

    #[test]
    fn test_rank_suggestions_are_capped_and_ordered() {
        let names = ["aaaaaaa", "ab", "abcd", "abcde", "abcdef", "abcdefg", "abx", "abcx"];
        let hits = names.iter().map(|n| hit(n, "abc")).collect();
        match rank(hits) {
            SearchOutcome::Suggestions(s) => {
                assert_eq!(s.len(), SUGGESTION_LIMIT);
                assert!(s.windows(2).all(|w| w[0].distance <= w[1].distance));
                assert_eq!(s[0].distance, 1);
            }
            other => panic!("expected suggestions, got {other:?}"),
        }
        assert_eq!(rank(Vec::new()), SearchOutcome::NoMatches);
    }

    #[test]
    fn test_parse_source_ref() {
        assert_eq!(
            parse_source_ref("modrinth:luckperms"),
            Some((SourceKind::Modrinth, "luckperms"))
        );
        assert_eq!(
            parse_source_ref("Hangar:EssentialsX/Essentials"),
            Some((SourceKind::Hangar, "EssentialsX/Essentials"))
        );
        assert_eq!(parse_source_ref("modrinth:"), None);
        assert_eq!(parse_source_ref("LuckPerms"), None);
        assert_eq!(parse_source_ref("curseforge:abc"), None);
    }

    #[test]
    fn test_hit_declaration_uses_stable_id() {
        let decl = hit("LuckPerms", "luckperms").declaration();
        assert_eq!(decl.identifier, "luckperms");
        assert!(decl.version.is_latest());
    }
}
