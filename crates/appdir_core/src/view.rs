use crate::catalog::{ALL_CATEGORY, AppRecord, Catalog};
use crate::config::DirectoryConfig;

/// Browsing state over a catalog: category filter, free-text search and a
/// "load more" style reveal count.
#[derive(Debug, Clone)]
pub struct CatalogView<'a> {
    catalog: &'a Catalog,
    category: String,
    search: String,
    displayed: usize,
    initial_page_size: usize,
    page_increment: usize,
}

impl<'a> CatalogView<'a> {
    pub fn new(catalog: &'a Catalog, initial_page_size: usize, page_increment: usize) -> Self {
        let initial_page_size = initial_page_size.max(1);
        Self {
            catalog,
            category: ALL_CATEGORY.to_string(),
            search: String::new(),
            displayed: initial_page_size,
            initial_page_size,
            page_increment: page_increment.max(1),
        }
    }

    pub fn from_config(catalog: &'a Catalog, config: &DirectoryConfig) -> Self {
        Self::new(catalog, config.initial_page_size(), config.page_increment())
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn categories(&self) -> &[String] {
        &self.catalog.categories
    }

    pub fn set_category(&mut self, category: &str) {
        let category = category.trim();
        self.category = if category.is_empty() {
            ALL_CATEGORY.to_string()
        } else {
            category.to_string()
        };
        self.displayed = self.initial_page_size;
    }

    pub fn set_search(&mut self, term: &str) {
        self.search = term.trim().to_lowercase();
        self.displayed = self.initial_page_size;
    }

    pub fn load_more(&mut self) {
        self.displayed = self.displayed.saturating_add(self.page_increment);
    }

    /// Every app matching the current category and search, in catalog order.
    pub fn filtered(&self) -> Vec<&'a AppRecord> {
        self.catalog
            .apps
            .iter()
            .filter(|app| self.matches_category(app) && self.matches_search(app))
            .collect()
    }

    pub fn visible(&self) -> Vec<&'a AppRecord> {
        let mut apps = self.filtered();
        apps.truncate(self.displayed);
        apps
    }

    pub fn has_more(&self) -> bool {
        self.filtered().len() > self.displayed
    }

    pub fn find(&self, id: &str) -> Option<&'a AppRecord> {
        self.catalog.apps.iter().find(|app| app.id == id)
    }

    fn matches_category(&self, app: &AppRecord) -> bool {
        self.category == ALL_CATEGORY || app.category == self.category
    }

    fn matches_search(&self, app: &AppRecord) -> bool {
        if self.search.is_empty() {
            return true;
        }
        [&app.name, &app.description, &app.publisher]
            .iter()
            .any(|field| field.to_lowercase().contains(&self.search))
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogView;
    use crate::catalog::{Catalog, sample_record};

    fn catalog(size: usize) -> Catalog {
        let apps = (0..size)
            .map(|index| {
                let mut app = sample_record(&format!("app-{index:02}"));
                app.category = if index % 3 == 0 { "Games" } else { "Tools" }.to_string();
                app
            })
            .collect();
        Catalog {
            apps,
            categories: vec!["All".to_string(), "Games".to_string(), "Tools".to_string()],
        }
    }

    fn ids(apps: &[&crate::catalog::AppRecord]) -> Vec<String> {
        apps.iter().map(|app| app.id.clone()).collect()
    }

    #[test]
    fn reveal_grows_by_increment() {
        let catalog = catalog(20);
        let mut view = CatalogView::new(&catalog, 9, 6);
        assert_eq!(view.visible().len(), 9);
        assert!(view.has_more());
        view.load_more();
        assert_eq!(view.visible().len(), 15);
        view.load_more();
        assert_eq!(view.visible().len(), 20);
        assert!(!view.has_more());
    }

    #[test]
    fn category_filter_resets_reveal() {
        let catalog = catalog(20);
        let mut view = CatalogView::new(&catalog, 3, 2);
        view.load_more();
        assert_eq!(view.visible().len(), 5);

        view.set_category("Games");
        assert_eq!(view.filtered().len(), 7);
        assert_eq!(view.visible().len(), 3);
        assert!(view.visible().iter().all(|app| app.category == "Games"));

        view.set_category("All");
        assert_eq!(view.filtered().len(), 20);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let mut catalog = catalog(4);
        catalog.apps[1].name = "Chess Master".to_string();
        catalog.apps[2].publisher = "ChessCorp".to_string();
        catalog.apps[3].description = "Play CHESS with friends".to_string();

        let mut view = CatalogView::new(&catalog, 9, 6);
        view.set_search("  chess ");
        assert_eq!(ids(&view.filtered()), vec!["app-01", "app-02", "app-03"]);

        view.set_category("Games");
        view.set_search("chess");
        assert_eq!(ids(&view.filtered()), vec!["app-03"]);
    }

    #[test]
    fn find_ignores_filters() {
        let catalog = catalog(4);
        let mut view = CatalogView::new(&catalog, 9, 6);
        view.set_category("Games");
        assert!(view.find("app-01").is_some());
        assert!(view.find("missing").is_none());
    }
}
