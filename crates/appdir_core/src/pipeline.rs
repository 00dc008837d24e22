use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{info, warn};

use crate::assets::validate_icon;
use crate::catalog::{Catalog, load_catalog, load_prior_catalog, write_catalog};
use crate::config::DirectoryConfig;
use crate::error::PipelineError;
use crate::filesystem::WriteOutcome;
use crate::manifest::decode_manifest;
use crate::reconcile::{FetchedApp, ReconcileDefaults, reconcile};
use crate::runtime::ResolvedPaths;
use crate::site::{SiteOptions, SiteReport, update_site_document};
use crate::upstream::{
    GithubClient, GithubClientConfig, RepoCoordinate, UpstreamApi, list_app_ids,
};

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub dry_run: bool,
    pub skip_site: bool,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedApp {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub success: bool,
    pub dry_run: bool,
    pub discovered: usize,
    pub processed: usize,
    pub skipped: Vec<SkippedApp>,
    pub featured: usize,
    pub icon_fallbacks: Vec<String>,
    pub catalog: WriteOutcome,
    pub site: Option<SiteReport>,
    pub warnings: Vec<String>,
    pub request_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InjectReport {
    pub apps: usize,
    pub featured: usize,
    pub site: SiteReport,
}

/// Refresh the catalog from the upstream repository and re-render the site.
pub fn run_update(
    paths: &ResolvedPaths,
    config: &DirectoryConfig,
    options: &UpdateOptions,
) -> Result<UpdateReport> {
    let client = GithubClient::new(GithubClientConfig::from_config(config))?;
    run_update_with_api(paths, config, options, &client)
}

pub fn run_update_with_api<A: UpstreamApi>(
    paths: &ResolvedPaths,
    config: &DirectoryConfig,
    options: &UpdateOptions,
    api: &A,
) -> Result<UpdateReport> {
    let repo = RepoCoordinate::from_config(config);
    let catalog_path = paths.catalog_path(config);
    let mut warnings = Vec::new();

    let prior = match load_prior_catalog(&catalog_path) {
        Ok(prior) => prior,
        Err(error) => {
            let mut message = format!("ignoring unreadable prior catalog: {error:#}");
            if !options.dry_run {
                let backup = backup_path(&catalog_path);
                fs::copy(&catalog_path, &backup).with_context(|| {
                    format!("failed to back up prior catalog to {}", backup.display())
                })?;
                message.push_str(&format!("; original kept at {}", backup.display()));
            }
            warn!("{message}");
            warnings.push(message);
            None
        }
    };

    let ids = list_app_ids(api, &repo).map_err(anyhow::Error::new)?;
    info!(count = ids.len(), "discovered apps upstream");

    let workers = options.workers.unwrap_or_else(|| config.workers()).max(1);
    let placeholder = config.placeholder_icon();
    let outcomes = fetch_all(&ids, workers, |id| fetch_app(api, &repo, id, placeholder))?;

    let mut fetched = Vec::new();
    let mut skipped = Vec::new();
    let mut icon_fallbacks = Vec::new();
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            Ok((app, used_placeholder)) => {
                if used_placeholder {
                    icon_fallbacks.push(id.clone());
                }
                fetched.push(app);
            }
            Err(error) => {
                warn!(app = %id, "skipping app: {error}");
                skipped.push(SkippedApp {
                    id: id.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    let defaults = ReconcileDefaults {
        categories: config.default_categories(),
        category: config.default_category().to_string(),
    };
    let catalog = reconcile(&fetched, prior.as_ref(), &defaults);
    let featured = catalog.featured().count();
    info!(
        processed = catalog.apps.len(),
        skipped = skipped.len(),
        featured,
        "reconciled catalog"
    );

    let catalog_outcome = write_catalog(&catalog_path, &catalog, options.dry_run)?;
    info!(
        path = %catalog_outcome.path.display(),
        changed = catalog_outcome.changed,
        dry_run = options.dry_run,
        "catalog processed"
    );

    let site = if options.skip_site {
        None
    } else {
        let report = update_site_document(
            &paths.html_path(config),
            &catalog,
            &SiteOptions::from_config(config),
            options.dry_run,
        )?;
        warnings.extend(report.warnings.iter().cloned());
        Some(report)
    };

    Ok(UpdateReport {
        success: true,
        dry_run: options.dry_run,
        discovered: ids.len(),
        processed: catalog.apps.len(),
        skipped,
        featured,
        icon_fallbacks,
        catalog: catalog_outcome,
        site,
        warnings,
        request_count: api.request_count(),
    })
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Re-render the site document from the persisted catalog. No network access.
pub fn run_inject(
    paths: &ResolvedPaths,
    config: &DirectoryConfig,
    dry_run: bool,
) -> Result<InjectReport> {
    let catalog = load_catalog(&paths.catalog_path(config), &config.default_categories())?;
    inject_catalog(paths, config, &catalog, dry_run)
}

fn inject_catalog(
    paths: &ResolvedPaths,
    config: &DirectoryConfig,
    catalog: &Catalog,
    dry_run: bool,
) -> Result<InjectReport> {
    let site = update_site_document(
        &paths.html_path(config),
        catalog,
        &SiteOptions::from_config(config),
        dry_run,
    )?;
    Ok(InjectReport {
        apps: catalog.apps.len(),
        featured: catalog.featured().count(),
        site,
    })
}

fn fetch_app<A: UpstreamApi + ?Sized>(
    api: &A,
    repo: &RepoCoordinate,
    app_id: &str,
    placeholder: &str,
) -> Result<(FetchedApp, bool), PipelineError> {
    let manifest_url = repo.manifest_url(app_id);
    let body = api
        .fetch_bytes(&manifest_url)
        .map_err(|error| PipelineError::ManifestFetch {
            app_id: app_id.to_string(),
            url: manifest_url.clone(),
            detail: format!("{error:#}"),
        })?;
    let manifest = decode_manifest(app_id, &body)?;
    let icon = validate_icon(api, app_id, &repo.icon_url(app_id), placeholder);
    let used_placeholder = icon.used_placeholder();

    Ok((
        FetchedApp {
            id: app_id.to_string(),
            manifest,
            icon: icon.url,
            github: repo.tree_url(app_id),
        },
        used_placeholder,
    ))
}

/// Run `task` for every id on at most `workers` scoped threads. Results come
/// back in the order of `ids` regardless of completion order.
fn fetch_all<T, F>(ids: &[String], workers: usize, task: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&str) -> T + Sync,
{
    if workers <= 1 || ids.len() <= 1 {
        return Ok(ids.iter().map(|id| task(id.as_str())).collect());
    }

    let next = AtomicUsize::new(0);
    let next = &next;
    let task = &task;
    let mut indexed = thread::scope(|scope| {
        let handles = (0..workers.min(ids.len()))
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(id) = ids.get(index) else {
                            break;
                        };
                        done.push((index, task(id.as_str())));
                    }
                    done
                })
            })
            .collect::<Vec<_>>();

        let mut collected = Vec::with_capacity(ids.len());
        for handle in handles {
            let done = handle
                .join()
                .map_err(|_| anyhow!("fetch worker panicked"))?;
            collected.extend(done);
        }
        Ok::<_, anyhow::Error>(collected)
    })?;

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, value)| value).collect())
}
