//! Platform compatibility tables
//!
//! Each catalog names platforms differently (Modrinth uses lowercase loader
//! categories, Hangar uppercase platform enums). A table maps every server
//! platform to the key that is an exact match and to the ordered keys it
//! also accepts. Platform lineage lives here and nowhere else: supporting a
//! new server fork is a one-line edit to a table.

use crate::catalog::SourceKind;
use crate::platform::ServerPlatform;

/// Outcome of checking one candidate against the target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Declares the target's own key, or the target imposes no constraint
    Exact,
    /// Declares only accepted keys; holds the most preferred one
    Fallback(&'static str),
    Incompatible,
}

impl Verdict {
    pub fn is_usable(&self) -> bool {
        !matches!(self, Verdict::Incompatible)
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Verdict::Exact)
    }
}

/// What a platform accepts in one catalog's vocabulary
#[derive(Debug, Clone, Copy)]
pub struct PlatformRule {
    pub platform: ServerPlatform,
    /// `None` when the catalog has no dedicated key for this platform
    pub exact: Option<&'static str>,
    /// Accepted keys in preference order
    pub fallbacks: &'static [&'static str],
}

/// One filtering pass of the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    /// `None` means no platform filter at all
    pub key: Option<&'static str>,
    pub exact: bool,
}

/// Platform lineage for one catalog
#[derive(Debug)]
pub struct CompatibilityTable {
    pub source: SourceKind,
    rules: &'static [PlatformRule],
    /// Every server-side key, used when searching without a platform
    all_keys: &'static [&'static str],
}

impl CompatibilityTable {
    pub fn rule(&self, platform: ServerPlatform) -> Option<&PlatformRule> {
        self.rules.iter().find(|r| r.platform == platform)
    }

    /// Grade a candidate by the platform keys it declares.
    ///
    /// Unset or unknown target platforms impose no constraint.
    pub fn verdict<'a, I>(&self, platform: Option<ServerPlatform>, keys: I) -> Verdict
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(rule) = platform.and_then(|p| self.rule(p)) else {
            return Verdict::Exact;
        };

        let keys: Vec<&str> = keys.into_iter().collect();
        let has = |wanted: &str| keys.iter().any(|k| k.eq_ignore_ascii_case(wanted));

        if rule.exact.is_some_and(has) {
            return Verdict::Exact;
        }
        rule.fallbacks
            .iter()
            .copied()
            .find(|k| has(k))
            .map(Verdict::Fallback)
            .unwrap_or(Verdict::Incompatible)
    }

    /// Whether a verdict belongs to `pass`
    pub fn admits(&self, pass: &Pass, verdict: Verdict) -> bool {
        match verdict {
            Verdict::Exact => pass.exact,
            Verdict::Fallback(key) => !pass.exact && pass.key == Some(key),
            Verdict::Incompatible => false,
        }
    }

    /// Filtering passes in the order the resolver should try them
    pub fn passes(&self, platform: Option<ServerPlatform>) -> Vec<Pass> {
        let Some(rule) = platform.and_then(|p| self.rule(p)) else {
            return vec![Pass {
                key: None,
                exact: true,
            }];
        };

        rule.exact
            .map(|key| Pass {
                key: Some(key),
                exact: true,
            })
            .into_iter()
            .chain(rule.fallbacks.iter().map(|key| Pass {
                key: Some(*key),
                exact: false,
            }))
            .collect()
    }

    /// Keys to search with: just the exact key when strict, otherwise the
    /// exact key and its fallbacks. No platform searches every server key.
    pub fn search_keys(&self, platform: Option<ServerPlatform>, strict: bool) -> Vec<&'static str> {
        let Some(rule) = platform.and_then(|p| self.rule(p)) else {
            return self.all_keys.to_vec();
        };

        let mut keys: Vec<&'static str> = rule.exact.into_iter().collect();
        if !strict {
            keys.extend(rule.fallbacks.iter().copied());
        }
        keys
    }
}

/// Modrinth loader categories
pub static MODRINTH: CompatibilityTable = CompatibilityTable {
    source: SourceKind::Modrinth,
    rules: &[
        PlatformRule {
            platform: ServerPlatform::Paper,
            exact: Some("paper"),
            fallbacks: &["spigot", "bukkit", "purpur", "folia"],
        },
        PlatformRule {
            platform: ServerPlatform::Purpur,
            exact: Some("purpur"),
            fallbacks: &["paper", "spigot", "bukkit", "folia"],
        },
        // Folia's threading model breaks many plain Bukkit plugins; they
        // remain usable only as an explicit fallback.
        PlatformRule {
            platform: ServerPlatform::Folia,
            exact: Some("folia"),
            fallbacks: &["paper", "spigot", "bukkit", "purpur"],
        },
        PlatformRule {
            platform: ServerPlatform::Spigot,
            exact: Some("spigot"),
            fallbacks: &["bukkit", "paper"],
        },
        PlatformRule {
            platform: ServerPlatform::Bukkit,
            exact: Some("bukkit"),
            fallbacks: &["spigot", "paper"],
        },
        PlatformRule {
            platform: ServerPlatform::Sponge,
            exact: Some("sponge"),
            fallbacks: &[],
        },
        PlatformRule {
            platform: ServerPlatform::Velocity,
            exact: Some("velocity"),
            fallbacks: &[],
        },
        PlatformRule {
            platform: ServerPlatform::Waterfall,
            exact: Some("bungeecord"),
            fallbacks: &["waterfall"],
        },
    ],
    all_keys: &[
        "bukkit",
        "folia",
        "paper",
        "purpur",
        "spigot",
        "sponge",
        "velocity",
        "bungeecord",
    ],
};

/// Hangar platforms
pub static HANGAR: CompatibilityTable = CompatibilityTable {
    source: SourceKind::Hangar,
    rules: &[
        PlatformRule {
            platform: ServerPlatform::Paper,
            exact: Some("PAPER"),
            fallbacks: &[],
        },
        PlatformRule {
            platform: ServerPlatform::Purpur,
            exact: None,
            fallbacks: &["PAPER"],
        },
        PlatformRule {
            platform: ServerPlatform::Folia,
            exact: None,
            fallbacks: &["PAPER"],
        },
        PlatformRule {
            platform: ServerPlatform::Spigot,
            exact: None,
            fallbacks: &["PAPER"],
        },
        PlatformRule {
            platform: ServerPlatform::Bukkit,
            exact: None,
            fallbacks: &["PAPER"],
        },
        PlatformRule {
            platform: ServerPlatform::Sponge,
            exact: None,
            fallbacks: &[],
        },
        PlatformRule {
            platform: ServerPlatform::Velocity,
            exact: Some("VELOCITY"),
            fallbacks: &[],
        },
        PlatformRule {
            platform: ServerPlatform::Waterfall,
            exact: Some("WATERFALL"),
            fallbacks: &[],
        },
    ],
    all_keys: &["PAPER", "VELOCITY", "WATERFALL"],
};
