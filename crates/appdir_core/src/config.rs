use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "appdir/0.1";
pub const DEFAULT_OWNER: &str = "ixian-platform";
pub const DEFAULT_REPO: &str = "Spixi-Mini-Apps";
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_APPS_PATH: &str = "apps";
pub const DEFAULT_MANIFEST_FILE: &str = "appinfo.spixi";
pub const DEFAULT_ICON_FILE: &str = "icon.png";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_WEB_BASE: &str = "https://github.com";

pub const DEFAULT_CATALOG_PATH: &str = "data/apps.json";
pub const DEFAULT_HTML_PATH: &str = "index.html";
pub const DEFAULT_PLACEHOLDER_ICON: &str = "assets/images/placeholder-app.png";
pub const DEFAULT_CATEGORY: &str = "Tools";
pub const DEFAULT_FEATURED_CLASS: &str = "featured-grid";
pub const DEFAULT_CATEGORIES: [&str; 6] = ["All", "AI", "Games", "IoT", "Tools", "Dev Tools"];

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_INITIAL_PAGE_SIZE: usize = 9;
pub const DEFAULT_PAGE_INCREMENT: usize = 6;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub browse: BrowseSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct UpstreamSection {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub apps_path: Option<String>,
    pub manifest_file: Option<String>,
    pub icon_file: Option<String>,
    pub api_base: Option<String>,
    pub raw_base: Option<String>,
    pub web_base: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub catalog_path: Option<String>,
    pub html_path: Option<String>,
    pub placeholder_icon: Option<String>,
    pub default_category: Option<String>,
    pub categories: Option<Vec<String>>,
    pub featured_container_class: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub timeout_ms: Option<u64>,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BrowseSection {
    pub initial_page_size: Option<usize>,
    pub page_increment: Option<usize>,
}

impl DirectoryConfig {
    pub fn owner(&self) -> String {
        env_or("APPDIR_GITHUB_OWNER", self.upstream.owner.as_deref(), DEFAULT_OWNER)
    }

    pub fn repo(&self) -> String {
        env_or("APPDIR_GITHUB_REPO", self.upstream.repo.as_deref(), DEFAULT_REPO)
    }

    pub fn branch(&self) -> String {
        env_or(
            "APPDIR_GITHUB_BRANCH",
            self.upstream.branch.as_deref(),
            DEFAULT_BRANCH,
        )
    }

    /// Resolve user agent: env APPDIR_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_or(
            "APPDIR_USER_AGENT",
            self.upstream.user_agent.as_deref(),
            DEFAULT_USER_AGENT,
        )
    }

    pub fn apps_path(&self) -> &str {
        self.upstream
            .apps_path
            .as_deref()
            .map(|value| value.trim_matches('/'))
            .unwrap_or(DEFAULT_APPS_PATH)
    }

    pub fn manifest_file(&self) -> &str {
        self.upstream
            .manifest_file
            .as_deref()
            .unwrap_or(DEFAULT_MANIFEST_FILE)
    }

    pub fn icon_file(&self) -> &str {
        self.upstream.icon_file.as_deref().unwrap_or(DEFAULT_ICON_FILE)
    }

    pub fn api_base(&self) -> &str {
        trimmed_base(self.upstream.api_base.as_deref(), DEFAULT_API_BASE)
    }

    pub fn raw_base(&self) -> &str {
        trimmed_base(self.upstream.raw_base.as_deref(), DEFAULT_RAW_BASE)
    }

    pub fn web_base(&self) -> &str {
        trimmed_base(self.upstream.web_base.as_deref(), DEFAULT_WEB_BASE)
    }

    pub fn catalog_path(&self) -> &str {
        self.site
            .catalog_path
            .as_deref()
            .unwrap_or(DEFAULT_CATALOG_PATH)
    }

    pub fn html_path(&self) -> &str {
        self.site.html_path.as_deref().unwrap_or(DEFAULT_HTML_PATH)
    }

    pub fn placeholder_icon(&self) -> &str {
        self.site
            .placeholder_icon
            .as_deref()
            .unwrap_or(DEFAULT_PLACEHOLDER_ICON)
    }

    pub fn default_category(&self) -> &str {
        self.site
            .default_category
            .as_deref()
            .unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn default_categories(&self) -> Vec<String> {
        match &self.site.categories {
            Some(categories) => categories.clone(),
            None => DEFAULT_CATEGORIES.iter().map(|value| value.to_string()).collect(),
        }
    }

    pub fn featured_container_class(&self) -> &str {
        self.site
            .featured_container_class
            .as_deref()
            .unwrap_or(DEFAULT_FEATURED_CLASS)
    }

    pub fn timeout_ms(&self) -> u64 {
        env_parse("APPDIR_HTTP_TIMEOUT_MS")
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn workers(&self) -> usize {
        env_parse("APPDIR_WORKERS")
            .or(self.http.workers)
            .unwrap_or(DEFAULT_WORKERS)
            .max(1)
    }

    /// Token for authenticated GitHub API calls (raises the rate limit).
    pub fn github_token(&self) -> Option<String> {
        env::var("GITHUB_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn initial_page_size(&self) -> usize {
        self.browse
            .initial_page_size
            .unwrap_or(DEFAULT_INITIAL_PAGE_SIZE)
    }

    pub fn page_increment(&self) -> usize {
        self.browse.page_increment.unwrap_or(DEFAULT_PAGE_INCREMENT)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_category().trim().is_empty() {
            bail!("site.default_category cannot be empty");
        }
        if let Some(categories) = &self.site.categories
            && categories.iter().any(|value| value.trim().is_empty())
        {
            bail!("site.categories cannot contain empty names");
        }
        if self.featured_container_class().split_whitespace().count() != 1 {
            bail!("site.featured_container_class must be a single class token");
        }
        if self.initial_page_size() == 0 || self.page_increment() == 0 {
            bail!("browse page sizes must be greater than zero");
        }
        Ok(())
    }
}

/// Load and parse a DirectoryConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<DirectoryConfig> {
    if !config_path.exists() {
        return Ok(DirectoryConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: DirectoryConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    Ok(parsed)
}

fn env_or(key: &str, configured: Option<&str>, default: &str) -> String {
    if let Ok(value) = env::var(key) {
        let trimmed = value.trim().to_string();
        if !trimmed.is_empty() {
            return trimmed;
        }
    }
    configured.unwrap_or(default).to_string()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn trimmed_base<'a>(configured: Option<&'a str>, default: &'a str) -> &'a str {
    configured.unwrap_or(default).trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_point_at_spixi_repository() {
        let config = DirectoryConfig::default();
        assert_eq!(config.apps_path(), "apps");
        assert_eq!(config.manifest_file(), "appinfo.spixi");
        assert_eq!(config.icon_file(), "icon.png");
        assert_eq!(config.catalog_path(), "data/apps.json");
        assert_eq!(config.default_category(), "Tools");
        assert_eq!(config.default_categories()[0], "All");
        assert_eq!(config.initial_page_size(), 9);
        assert_eq!(config.page_increment(), 6);
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, DirectoryConfig::default());
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[upstream]
apps_path = "/mini-apps/"
api_base = "https://ghe.example.org/api/v3/"

[site]
catalog_path = "public/apps.json"
categories = ["All", "Games"]
default_category = "Games"

[http]
timeout_ms = 5000
workers = 2

[browse]
initial_page_size = 12
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.apps_path(), "mini-apps");
        assert_eq!(config.api_base(), "https://ghe.example.org/api/v3");
        assert_eq!(config.catalog_path(), "public/apps.json");
        assert_eq!(config.default_categories(), vec!["All", "Games"]);
        assert_eq!(config.default_category(), "Games");
        assert_eq!(config.http.timeout_ms, Some(5000));
        assert_eq!(config.http.workers, Some(2));
        assert_eq!(config.initial_page_size(), 12);
        assert_eq!(config.page_increment(), 6);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[site\ncatalog_path = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_zero_page_size() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[browse]\npage_increment = 0\n").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(format!("{error:#}").contains("page sizes"));
    }

    #[test]
    fn featured_class_must_be_single_token() {
        let config = DirectoryConfig {
            site: SiteSection {
                featured_container_class: Some("featured grid".to_string()),
                ..SiteSection::default()
            },
            ..DirectoryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
