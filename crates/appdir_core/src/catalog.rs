use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::filesystem::{WriteOutcome, write_if_changed};

pub const DEFAULT_VERSION: &str = "0.0.0";
pub const ALL_CATEGORY: &str = "All";

/// One mini-app entry of the directory.
///
/// Reading is lenient because `apps.json` is curated by hand: `null` falls back
/// to the field default and booleans may be written as strings or numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publisher: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub featured: bool,
    #[serde(default = "default_version", deserialize_with = "lenient_version")]
    pub version: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub icon: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub spixi_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub github: String,
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub website: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_optional_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub single_user: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_optional_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub multi_user: Option<bool>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) => Some(value),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_string(deserializer)?.unwrap_or_default())
}

fn lenient_version<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_string(deserializer)?
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(default_version))
}

fn lenient_optional_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(value) => Some(value),
        Value::Number(value) => Some(value.as_f64().is_some_and(|number| number != 0.0)),
        Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_bool(deserializer)?.unwrap_or(false))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Catalog {
    pub apps: Vec<AppRecord>,
    pub categories: Vec<String>,
}

impl Catalog {
    pub fn find(&self, id: &str) -> Option<&AppRecord> {
        self.apps.iter().find(|app| app.id == id)
    }

    pub fn featured(&self) -> impl Iterator<Item = &AppRecord> {
        self.apps.iter().filter(|app| app.featured)
    }
}

/// Catalog as found on disk before a run. `categories` stays `None` when the
/// file never declared them so defaults can be told apart from an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct PriorCatalog {
    #[serde(default, deserialize_with = "lenient_records")]
    pub apps: Vec<AppRecord>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

impl PriorCatalog {
    pub fn find(&self, id: &str) -> Option<&AppRecord> {
        self.apps.iter().find(|app| app.id == id)
    }
}

/// Keep every record that has a usable `id`; drop the rest with a warning
/// instead of rejecting the whole file.
fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<AppRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<AppRecord>(value) {
            Ok(record) if !record.id.trim().is_empty() => records.push(record),
            Ok(_) => warn!(index, "ignoring prior catalog entry with an empty id"),
            Err(error) => warn!(index, "ignoring unreadable prior catalog entry: {error}"),
        }
    }
    Ok(records)
}

/// Load the persisted catalog. Returns `None` when the file doesn't exist.
pub fn load_prior_catalog(path: &Path) -> Result<Option<PriorCatalog>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PriorCatalog = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(parsed))
}

/// Load a catalog that must exist, filling absent categories with `default_categories`.
pub fn load_catalog(path: &Path, default_categories: &[String]) -> Result<Catalog> {
    let prior = load_prior_catalog(path)?
        .ok_or_else(|| anyhow::anyhow!("catalog not found: {}", path.display()))?;
    Ok(Catalog {
        apps: prior.apps,
        categories: prior
            .categories
            .unwrap_or_else(|| default_categories.to_vec()),
    })
}

/// Stable pretty rendering: two-space indent, declared key order, trailing newline.
pub fn render_catalog_json(catalog: &Catalog) -> Result<String> {
    let mut rendered =
        serde_json::to_string_pretty(catalog).context("failed to serialize catalog JSON")?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write the catalog when its rendering differs from the file on disk.
pub fn write_catalog(path: &Path, catalog: &Catalog, dry_run: bool) -> Result<WriteOutcome> {
    let rendered = render_catalog_json(catalog)?;
    write_if_changed(path, &rendered, dry_run)
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str) -> AppRecord {
    AppRecord {
        id: id.to_string(),
        name: id.to_string(),
        publisher: "Unknown".to_string(),
        description: "No description available.".to_string(),
        category: "Tools".to_string(),
        featured: false,
        version: DEFAULT_VERSION.to_string(),
        icon: format!("https://raw.example/{id}/icon.png"),
        spixi_url: format!("spixi://app/{id}"),
        github: format!("https://github.example/tree/{id}"),
        website: None,
        single_user: None,
        multi_user: None,
    }
}
