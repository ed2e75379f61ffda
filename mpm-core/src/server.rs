//! Server binary downloads
//!
//! Each server family publishes builds differently. Resolution turns
//! `(platform, game version, build)` into a URL plus, where the vendor
//! publishes one, a SHA-256 digest. The jar then goes through the same
//! fetch-and-verify path as plugins and lands as `server.jar`.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::catalog::http::{get_json, DEFAULT_REQUEST_TIMEOUT};
use crate::catalog::HttpDownloader;
use crate::error::{MpmError, Result};
use crate::install::{fetch_and_verify, FetchOutcome, FetchRequest, JobProgress};
use crate::integrity::DigestAlgorithm;
use crate::platform::ServerPlatform;

/// File name the server binary is saved under
pub const SERVER_JAR: &str = "server.jar";

pub const PAPER_API: &str = "https://api.papermc.io/v2";
pub const PURPUR_API: &str = "https://api.purpurmc.org/v2";
pub const GETBUKKIT_URL: &str = "https://download.getbukkit.org";
pub const SPONGE_REPO: &str =
    "https://repo.spongepowered.org/repository/maven-releases/org/spongepowered/spongevanilla";

/// A resolved server build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBuild {
    pub platform: ServerPlatform,
    pub game_version: String,
    pub build: String,
    pub url: String,
    pub sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaperBuilds {
    #[serde(default)]
    builds: Vec<PaperBuild>,
}

#[derive(Debug, Deserialize)]
struct PaperBuild {
    build: u64,
    #[serde(default)]
    downloads: Option<PaperDownloads>,
}

#[derive(Debug, Deserialize)]
struct PaperDownloads {
    application: Option<PaperFile>,
}

#[derive(Debug, Deserialize)]
struct PaperFile {
    name: String,
    #[serde(default)]
    sha256: Option<String>,
}

/// PaperMC project name, for platforms PaperMC hosts
pub fn paper_project(platform: ServerPlatform) -> Option<&'static str> {
    match platform {
        ServerPlatform::Paper => Some("paper"),
        ServerPlatform::Folia => Some("folia"),
        ServerPlatform::Velocity => Some("velocity"),
        ServerPlatform::Waterfall => Some("waterfall"),
        _ => None,
    }
}

/// SpongeAPI release matching a game version
pub fn sponge_api_version(game_version: &str) -> &'static str {
    const TABLE: &[(&str, &str)] = &[
        ("1.16", "8.2.0"),
        ("1.18", "9.0.0"),
        ("1.19", "10.0.0"),
        ("1.20", "11.0.0"),
        ("1.21", "11.0.0"),
    ];
    TABLE
        .iter()
        .find(|(prefix, _)| game_version.starts_with(prefix))
        .map(|(_, api)| *api)
        .unwrap_or("11.0.0")
}

fn wants_latest(build: &str) -> bool {
    let build = build.trim();
    build.is_empty() || build.eq_ignore_ascii_case("latest")
}

/// Pick the requested build from PaperMC's build list (last is newest)
fn pick_paper_build(
    project: &str,
    game_version: &str,
    build: &str,
    builds: PaperBuilds,
) -> Result<(u64, Option<PaperFile>)> {
    let picked = if wants_latest(build) {
        builds.builds.into_iter().last()
    } else {
        builds
            .builds
            .into_iter()
            .find(|b| b.build.to_string() == build.trim())
    };

    let picked = picked.ok_or_else(|| MpmError::VersionNotFound {
        name: format!("{project} {game_version}"),
        requested: if wants_latest(build) {
            "latest".to_string()
        } else {
            build.to_string()
        },
    })?;
    Ok((picked.build, picked.downloads.and_then(|d| d.application)))
}

/// Resolves server builds against the vendors' APIs
pub struct ServerResolver {
    client: reqwest::Client,
    paper_api: String,
    timeout: Duration,
}

impl ServerResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            paper_api: PAPER_API.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_paper_api(mut self, base_url: &str) -> Self {
        self.paper_api = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn resolve(
        &self,
        platform: ServerPlatform,
        game_version: &str,
        build: &str,
    ) -> Result<ServerBuild> {
        if game_version.trim().is_empty() {
            return Err(MpmError::Config(
                "server.minecraft_version is required to download a server".to_string(),
            ));
        }

        if let Some(project) = paper_project(platform) {
            return self.resolve_paper(platform, project, game_version, build).await;
        }

        let (build, url) = match platform {
            ServerPlatform::Purpur => {
                let build = if wants_latest(build) { "latest" } else { build.trim() };
                (
                    build.to_string(),
                    format!("{PURPUR_API}/purpur/{game_version}/{build}/download"),
                )
            }
            ServerPlatform::Spigot => (
                game_version.to_string(),
                format!("{GETBUKKIT_URL}/spigot/spigot-{game_version}.jar"),
            ),
            ServerPlatform::Bukkit => (
                game_version.to_string(),
                format!("{GETBUKKIT_URL}/craftbukkit/craftbukkit-{game_version}.jar"),
            ),
            ServerPlatform::Sponge => {
                let build = if wants_latest(build) {
                    format!("{game_version}-{}", sponge_api_version(game_version))
                } else {
                    build.trim().to_string()
                };
                let url = format!("{SPONGE_REPO}/{build}/spongevanilla-{build}.jar");
                (build, url)
            }
            other => {
                return Err(MpmError::Config(format!(
                    "no server download available for {other}"
                )))
            }
        };

        Ok(ServerBuild {
            platform,
            game_version: game_version.to_string(),
            build,
            url,
            sha256: None,
        })
    }

    async fn resolve_paper(
        &self,
        platform: ServerPlatform,
        project: &str,
        game_version: &str,
        build: &str,
    ) -> Result<ServerBuild> {
        let request = self.client.get(format!(
            "{}/projects/{}/versions/{}/builds",
            self.paper_api, project, game_version
        ));
        let builds: PaperBuilds = get_json(&self.client, request, self.timeout).await?;
        let (number, file) = pick_paper_build(project, game_version, build, builds)?;

        let filename = file
            .as_ref()
            .map(|f| f.name.clone())
            .unwrap_or_else(|| format!("{project}-{game_version}-{number}.jar"));
        let url = format!(
            "{}/projects/{}/versions/{}/builds/{}/downloads/{}",
            self.paper_api, project, game_version, number, filename
        );

        Ok(ServerBuild {
            platform,
            game_version: game_version.to_string(),
            build: number.to_string(),
            url,
            sha256: file.and_then(|f| f.sha256),
        })
    }
}

/// Resolve and download a server jar into `dest_dir/server.jar`
#[allow(clippy::too_many_arguments)]
pub async fn install_server(
    resolver: &ServerResolver,
    downloader: &HttpDownloader,
    platform: ServerPlatform,
    game_version: &str,
    build: &str,
    dest_dir: &Path,
    force: bool,
    progress: &JobProgress,
) -> Result<(ServerBuild, FetchOutcome)> {
    let server = resolver.resolve(platform, game_version, build).await?;
    tracing::info!(
        "Downloading {} {} build {}",
        server.platform,
        server.game_version,
        server.build
    );

    let request = FetchRequest {
        url: server.url.clone(),
        filename: SERVER_JAR.to_string(),
        dest_dir: dest_dir.to_path_buf(),
        expected_digest: server.sha256.clone(),
        algorithm: DigestAlgorithm::Sha256,
        force,
    };
    let outcome = fetch_and_verify(downloader, &request, progress).await?;
    Ok((server, outcome))
}
