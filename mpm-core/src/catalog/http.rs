//! Shared HTTP plumbing for catalog clients and plain file downloads

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{Download, Downloader, HANGAR_BASE_URL, MODRINTH_BASE_URL};
use crate::error::{MpmError, Result};

/// Default timeout for metadata requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection setup timeout, applied to downloads as well
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP settings shared by every catalog
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub modrinth_base_url: String,
    pub hangar_base_url: String,
    pub user_agent: String,
    /// Applies to metadata calls only; downloads are bounded by connect timeout
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            modrinth_base_url: MODRINTH_BASE_URL.to_string(),
            hangar_base_url: HANGAR_BASE_URL.to_string(),
            user_agent: concat!("mpm/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Build the reqwest client every catalog shares
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout)
        .build()?;
    Ok(client)
}

/// Turn non-2xx responses into [`MpmError::Catalog`] with the raw body
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!("Catalog error: HTTP {} from {}: {}", status, url, body);

    Err(MpmError::Catalog {
        status: status.as_u16(),
        body,
        url,
    })
}

/// GET a JSON document with the metadata timeout
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T> {
    let request = request.timeout(timeout).build()?;
    tracing::debug!("GET {}", request.url());

    let response = check_status(client.execute(request).await?).await?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Open a streaming download
pub(crate) async fn open_download(client: &reqwest::Client, url: &str) -> Result<Download> {
    tracing::debug!("Downloading {}", url);

    let response = check_status(client.get(url).send().await?).await?;
    let length = response.content_length().filter(|len| *len > 0);
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(MpmError::from))
        .boxed();

    Ok(Download { length, body })
}

/// Plain HTTP downloads for files outside any catalog (server binaries)
#[derive(Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Download> {
        open_download(&self.client, url).await
    }
}
