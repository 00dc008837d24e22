use tracing::warn;

use crate::catalog::{AppRecord, Catalog, DEFAULT_VERSION, PriorCatalog};
use crate::manifest::{KEY_DESCRIPTION, KEY_NAME, KEY_PUBLISHER, KEY_VERSION, Manifest};
use crate::upstream::spixi_url;

pub const UNKNOWN_PUBLISHER: &str = "Unknown";
pub const NO_DESCRIPTION: &str = "No description available.";

/// Everything learned about one app from the upstream repository in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedApp {
    pub id: String,
    pub manifest: Manifest,
    pub icon: String,
    pub github: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileDefaults {
    pub categories: Vec<String>,
    pub category: String,
}

/// Merge one fetched app with its previously curated record.
///
/// The manifest owns identity and versioning (`name`, `publisher`,
/// `version`); the prior record owns editorial fields (`category`,
/// `featured`, `website`, capability flags) and backs up `description`.
pub fn reconcile_record(
    fetched: &FetchedApp,
    prior: Option<&AppRecord>,
    default_category: &str,
) -> AppRecord {
    let manifest = &fetched.manifest;
    let description = manifest
        .field(KEY_DESCRIPTION)
        .or_else(|| prior.and_then(|record| non_empty(&record.description)))
        .unwrap_or(NO_DESCRIPTION);
    let category = prior
        .and_then(|record| non_empty(&record.category))
        .unwrap_or(default_category);

    AppRecord {
        id: fetched.id.clone(),
        name: manifest.field(KEY_NAME).unwrap_or(&fetched.id).to_string(),
        publisher: manifest
            .field(KEY_PUBLISHER)
            .unwrap_or(UNKNOWN_PUBLISHER)
            .to_string(),
        description: description.to_string(),
        category: category.to_string(),
        featured: prior.map(|record| record.featured).unwrap_or(false),
        version: manifest
            .field(KEY_VERSION)
            .unwrap_or(DEFAULT_VERSION)
            .to_string(),
        icon: fetched.icon.clone(),
        spixi_url: spixi_url(&fetched.id),
        github: fetched.github.clone(),
        website: prior
            .and_then(|record| record.website.clone())
            .filter(|value| !value.trim().is_empty()),
        single_user: prior.and_then(|record| record.single_user),
        multi_user: prior.and_then(|record| record.multi_user),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Build the new catalog from this run's fetched apps.
///
/// Apps missing upstream are dropped. The category set is carried forward
/// unchanged from the prior catalog and only replaced by defaults when it was
/// absent. Curated categories outside that set are kept as they are and only
/// logged.
pub fn reconcile(
    fetched: &[FetchedApp],
    prior: Option<&PriorCatalog>,
    defaults: &ReconcileDefaults,
) -> Catalog {
    let categories = prior
        .and_then(|catalog| catalog.categories.clone())
        .unwrap_or_else(|| defaults.categories.clone());

    let apps: Vec<AppRecord> = fetched
        .iter()
        .map(|app| {
            let previous = prior.and_then(|catalog| catalog.find(&app.id));
            reconcile_record(app, previous, &defaults.category)
        })
        .collect();

    for record in &apps {
        if !categories.iter().any(|value| value == &record.category) {
            warn!(
                app = %record.id,
                category = %record.category,
                "category is not listed in the catalog's category set"
            );
        }
    }

    Catalog { apps, categories }
}

#[cfg(test)]
mod tests {
    use super::{FetchedApp, NO_DESCRIPTION, ReconcileDefaults, reconcile, reconcile_record};
    use crate::catalog::{PriorCatalog, sample_record};
    use crate::manifest::{Manifest, parse_manifest};

    fn fetched(id: &str, manifest: &str) -> FetchedApp {
        FetchedApp {
            id: id.to_string(),
            manifest: parse_manifest(manifest),
            icon: format!("https://raw.example/{id}/icon.png"),
            github: format!("https://github.example/tree/{id}"),
        }
    }

    fn defaults() -> ReconcileDefaults {
        ReconcileDefaults {
            categories: ["All", "AI", "Games", "IoT", "Tools", "Dev Tools"]
                .iter()
                .map(|value| value.to_string())
                .collect(),
            category: "Tools".to_string(),
        }
    }

    #[test]
    fn manifest_fields_fall_back_to_fixed_defaults() {
        let app = FetchedApp {
            manifest: Manifest::default(),
            ..fetched("gamma", "")
        };
        let record = reconcile_record(&app, None, "Tools");
        assert_eq!(record.name, "gamma");
        assert_eq!(record.publisher, "Unknown");
        assert_eq!(record.version, "0.0.0");
        assert_eq!(record.description, NO_DESCRIPTION);
        assert_eq!(record.category, "Tools");
        assert!(!record.featured);
        assert_eq!(record.spixi_url, "spixi://app/gamma");
    }

    #[test]
    fn prior_category_wins_over_default() {
        let mut prior = sample_record("alpha");
        prior.category = "Games".to_string();
        let record = reconcile_record(&fetched("alpha", "name=Alpha"), Some(&prior), "Tools");
        assert_eq!(record.category, "Games");
    }

    #[test]
    fn manifest_is_authoritative_for_identity_fields() {
        let mut prior = sample_record("alpha");
        prior.name = "Old Name".to_string();
        prior.version = "0.9.0".to_string();
        prior.description = "Curated text".to_string();
        prior.featured = true;
        prior.website = Some("https://alpha.example".to_string());
        prior.multi_user = Some(true);

        let record = reconcile_record(
            &fetched("alpha", "name=Alpha\nversion=1.0.0\ndescription=Fresh text"),
            Some(&prior),
            "Tools",
        );
        assert_eq!(record.name, "Alpha");
        assert_eq!(record.version, "1.0.0");
        assert_eq!(record.description, "Fresh text");
        assert!(record.featured);
        assert_eq!(record.website.as_deref(), Some("https://alpha.example"));
        assert_eq!(record.multi_user, Some(true));
    }

    #[test]
    fn prior_description_backs_up_empty_manifest_description() {
        let mut prior = sample_record("alpha");
        prior.description = "Curated text".to_string();
        let record = reconcile_record(&fetched("alpha", "description= "), Some(&prior), "Tools");
        assert_eq!(record.description, "Curated text");
    }

    #[test]
    fn apps_missing_upstream_are_dropped() {
        let prior = PriorCatalog {
            apps: vec![sample_record("alpha"), sample_record("retired")],
            categories: Some(vec!["All".to_string(), "Tools".to_string()]),
        };
        let catalog = reconcile(&[fetched("alpha", "")], Some(&prior), &defaults());
        assert_eq!(catalog.apps.len(), 1);
        assert!(catalog.find("retired").is_none());
        assert_eq!(catalog.categories, vec!["All", "Tools"]);
    }

    #[test]
    fn absent_prior_categories_use_defaults() {
        let prior = PriorCatalog {
            apps: Vec::new(),
            categories: None,
        };
        let catalog = reconcile(&[], Some(&prior), &defaults());
        assert_eq!(catalog.categories, defaults().categories);
        let catalog = reconcile(&[], None, &defaults());
        assert_eq!(catalog.categories, defaults().categories);
    }

    #[test]
    fn curated_categories_and_set_survive_unchanged() {
        let mut prior_alpha = sample_record("alpha");
        prior_alpha.category = "Games".to_string();
        let prior = PriorCatalog {
            apps: vec![prior_alpha],
            categories: Some(vec!["All".to_string(), "AI".to_string()]),
        };
        let catalog = reconcile(&[fetched("alpha", "")], Some(&prior), &defaults());
        assert_eq!(catalog.categories, vec!["All", "AI"]);
        assert_eq!(catalog.apps[0].category, "Games");
    }

    #[test]
    fn order_follows_fetched_order() {
        let catalog = reconcile(
            &[fetched("zeta", ""), fetched("alpha", "")],
            None,
            &defaults(),
        );
        let ids: Vec<&str> = catalog.apps.iter().map(|app| app.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
    }
}
