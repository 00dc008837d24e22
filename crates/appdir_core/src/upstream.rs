use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::error::PipelineError;

pub const SPIXI_URL_SCHEME: &str = "spixi";

/// Location of the apps directory inside the upstream repository, plus the
/// hosts used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinate {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub apps_path: String,
    pub manifest_file: String,
    pub icon_file: String,
    pub api_base: String,
    pub raw_base: String,
    pub web_base: String,
}

impl RepoCoordinate {
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            owner: config.owner(),
            repo: config.repo(),
            branch: config.branch(),
            apps_path: config.apps_path().to_string(),
            manifest_file: config.manifest_file().to_string(),
            icon_file: config.icon_file().to_string(),
            api_base: config.api_base().to_string(),
            raw_base: config.raw_base().to_string(),
            web_base: config.web_base().to_string(),
        }
    }

    pub fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base, self.owner, self.repo, self.apps_path, self.branch
        )
    }

    pub fn manifest_url(&self, app_id: &str) -> String {
        self.raw_file_url(app_id, &self.manifest_file)
    }

    pub fn icon_url(&self, app_id: &str) -> String {
        self.raw_file_url(app_id, &self.icon_file)
    }

    pub fn tree_url(&self, app_id: &str) -> String {
        format!(
            "{}/{}/{}/tree/{}/{}/{}",
            self.web_base, self.owner, self.repo, self.branch, self.apps_path, app_id
        )
    }

    fn raw_file_url(&self, app_id: &str, file: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}/{}",
            self.raw_base, self.owner, self.repo, self.branch, self.apps_path, app_id, file
        )
    }
}

impl Default for RepoCoordinate {
    fn default() -> Self {
        Self::from_config(&DirectoryConfig::default())
    }
}

pub fn spixi_url(app_id: &str) -> String {
    format!("{SPIXI_URL_SCHEME}://app/{app_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// Read-only access to the upstream repository. Implementations must be
/// shareable across the fetch workers.
pub trait UpstreamApi: Sync {
    fn list_directory(&self, url: &str) -> Result<Vec<DirectoryEntry>>;
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
    fn head(&self, url: &str) -> Result<()>;
    fn request_count(&self) -> usize;
}

/// Enumerate app ids (directory names) under the apps path, in listing order.
pub fn list_app_ids<A: UpstreamApi + ?Sized>(
    api: &A,
    repo: &RepoCoordinate,
) -> Result<Vec<String>, PipelineError> {
    let url = repo.contents_url();
    let entries = api
        .list_directory(&url)
        .map_err(|error| PipelineError::RemoteListing {
            url: url.clone(),
            detail: format!("{error:#}"),
        })?;

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for entry in entries {
        let name = entry.name.trim();
        if !entry.is_dir() || name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            ids.push(name.to_string());
        }
    }
    Ok(ids)
}

#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub token: Option<String>,
}

impl GithubClientConfig {
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            token: config.github_token(),
        }
    }
}

pub struct GithubClient {
    client: Client,
    config: GithubClientConfig,
    request_count: AtomicUsize,
}

impl GithubClient {
    pub fn new(config: GithubClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: AtomicUsize::new(0),
        })
    }

    fn get(&self, url: &str, accept: &str) -> Result<reqwest::blocking::Response> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        debug!(url, "GET");
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", self.config.user_agent.clone())
            .header("Accept", accept);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .with_context(|| format!("failed to fetch {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} while fetching {}", status.as_u16(), url);
        }
        Ok(response)
    }
}

impl UpstreamApi for GithubClient {
    fn list_directory(&self, url: &str) -> Result<Vec<DirectoryEntry>> {
        let response = self.get(url, "application/vnd.github+json")?;
        response
            .json::<Vec<DirectoryEntry>>()
            .context("failed to decode directory listing JSON")
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url, "text/plain, */*;q=0.1")?;
        let body = response.bytes().context("failed to read response body")?;
        Ok(body.to_vec())
    }

    fn head(&self, url: &str) -> Result<()> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        debug!(url, "HEAD");
        let response = self
            .client
            .head(url)
            .header("User-Agent", self.config.user_agent.clone())
            .send()
            .with_context(|| format!("HEAD request failed for {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} while probing {}", status.as_u16(), url);
        }
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{Result, bail};

    use super::{DirectoryEntry, RepoCoordinate, UpstreamApi};

    /// In-memory upstream keyed by URL.
    #[derive(Default)]
    pub struct MockUpstream {
        pub listing: Option<Vec<DirectoryEntry>>,
        pub files: BTreeMap<String, Vec<u8>>,
        pub assets: BTreeSet<String>,
        pub request_count: AtomicUsize,
    }

    impl MockUpstream {
        pub fn with_dirs(names: &[&str]) -> Self {
            Self {
                listing: Some(
                    names
                        .iter()
                        .map(|name| DirectoryEntry {
                            name: name.to_string(),
                            kind: "dir".to_string(),
                        })
                        .collect(),
                ),
                ..Self::default()
            }
        }

        pub fn manifest(mut self, repo: &RepoCoordinate, app_id: &str, content: &str) -> Self {
            self.files
                .insert(repo.manifest_url(app_id), content.as_bytes().to_vec());
            self
        }

        pub fn icon(mut self, repo: &RepoCoordinate, app_id: &str) -> Self {
            self.assets.insert(repo.icon_url(app_id));
            self
        }
    }

    impl UpstreamApi for MockUpstream {
        fn list_directory(&self, url: &str) -> Result<Vec<DirectoryEntry>> {
            self.request_count.fetch_add(1, Ordering::Relaxed);
            match &self.listing {
                Some(entries) => Ok(entries.clone()),
                None => bail!("HTTP 503 while fetching {url}"),
            }
        }

        fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
            self.request_count.fetch_add(1, Ordering::Relaxed);
            match self.files.get(url) {
                Some(body) => Ok(body.clone()),
                None => bail!("HTTP 404 while fetching {url}"),
            }
        }

        fn head(&self, url: &str) -> Result<()> {
            self.request_count.fetch_add(1, Ordering::Relaxed);
            if self.assets.contains(url) {
                Ok(())
            } else {
                bail!("HTTP 404 while probing {url}")
            }
        }

        fn request_count(&self) -> usize {
            self.request_count.load(Ordering::Relaxed)
        }
    }
}
