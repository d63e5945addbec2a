//! Store catalog: category name -> ordered store configurations.
//!
//! The catalog is pure data, read from YAML and validated once at startup.
//! Any store missing a required selector chain, or carrying a malformed URL,
//! fails the whole load so problems never surface mid-scrape.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::extract::is_absolute_url;
use crate::traits::{Pagination, StoreConfig};

/// Built-in catalog, compiled into the binary.
const BUILTIN_CATALOG: &str = include_str!("../../config/stores.yaml");

/// Requesting this category selects every store in catalog order.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    categories: Vec<CategoryStores>,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryStores {
    name: String,
    stores: Vec<StoreConfig>,
}

/// Validated, immutable store catalog
#[derive(Debug, Clone)]
pub struct StoreRegistry {
    categories: Vec<CategoryStores>,
}

impl StoreRegistry {
    /// Loads the catalog shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded catalog fails validation.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// Loads and validates a catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogIo {
            path: path.display().to_string(),
            source: e,
        })?;
        let registry = Self::from_yaml_str(&content)?;
        info!(
            path = %path.display(),
            stores = registry.len(),
            "Loaded store catalog"
        );
        Ok(registry)
    }

    /// Parses and validates catalog YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CatalogParse`] on malformed YAML (including CSS
    /// selectors that do not compile), or a validation error.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let registry = Self {
            categories: file.categories,
        };
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for category in &self.categories {
            if category.stores.is_empty() {
                return Err(ConfigError::EmptyCategory(category.name.clone()));
            }
            for store in &category.stores {
                validate_store(store)?;
                if !seen.insert(store.name.to_lowercase()) {
                    return Err(ConfigError::DuplicateStore(store.name.clone()));
                }
            }
        }

        Ok(())
    }

    /// Stores for `category`, in catalog order. `"all"` unions every category;
    /// an unknown category yields no stores.
    #[must_use]
    pub fn stores_for(&self, category: &str) -> Vec<&StoreConfig> {
        let category = category.trim();
        if category.eq_ignore_ascii_case(ALL_CATEGORIES) {
            return self.iter().collect();
        }
        self.categories
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case(category))
            .flat_map(|c| c.stores.iter())
            .collect()
    }

    /// Linear scan by store name (case-insensitive).
    #[must_use]
    pub fn find_store(&self, name: &str) -> Option<&StoreConfig> {
        let name = name.trim();
        self.iter().find(|store| store.name.eq_ignore_ascii_case(name))
    }

    /// `true` for `"all"` or a category present in the catalog.
    #[must_use]
    pub fn has_category(&self, category: &str) -> bool {
        category.trim().eq_ignore_ascii_case(ALL_CATEGORIES)
            || self
                .categories
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(category.trim()))
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    /// Every store in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &StoreConfig> {
        self.categories.iter().flat_map(|c| c.stores.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidStore {
        store: if store.name.trim().is_empty() {
            "<unnamed>".to_string()
        } else {
            store.name.clone()
        },
        reason: reason.to_string(),
    };

    if store.name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }

    for url in store.listing_urls() {
        if !is_absolute_url(url) {
            return Err(invalid(&format!("listing URL \"{url}\" is not an absolute http(s) URL")));
        }
    }

    if !store.url_prefix.is_empty() && !is_absolute_url(&store.url_prefix) {
        return Err(invalid(&format!(
            "url_prefix \"{}\" is not an absolute http(s) URL",
            store.url_prefix
        )));
    }

    let selectors = &store.selectors;
    let required = [
        ("container", &selectors.container),
        ("title", &selectors.title),
        ("current_price", &selectors.current_price),
    ];
    for (field, chain) in required {
        if chain.is_empty() {
            return Err(invalid(&format!("no selectors for {field}")));
        }
    }
    if selectors.link.is_empty() {
        return Err(invalid("no selectors for link"));
    }

    match &store.pagination {
        Pagination::Offset { page_size: 0, .. } => {
            return Err(invalid("offset pagination needs a non-zero page_size"));
        }
        Pagination::PageNumber { param, .. } | Pagination::Offset { param, .. }
            if param.trim().is_empty() =>
        {
            return Err(invalid("pagination param is empty"));
        }
        _ => {}
    }

    if store.max_products == Some(0) {
        return Err(invalid("max_products must be at least 1"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
categories:
  - name: sportswear
    stores:
      - name: Alpha
        base_url: https://alpha.test/sale
        url_prefix: https://alpha.test
        selectors:
          container: .card
          title: .title
          current_price: .price
          link: a
  - name: beauty
    stores:
      - name: Beta
        base_url: https://beta.test/sale
        category: Beauty
        selectors:
          container: [".tile", ".card"]
          title: .name
          current_price: .now
          original_price: .was
          link: a
"#;

    #[test]
    fn builtin_catalog_is_valid() {
        let registry = StoreRegistry::builtin().unwrap();
        assert_eq!(registry.stores_for("sportswear").len(), 7);
        assert_eq!(registry.stores_for("beauty").len(), 4);
        assert_eq!(registry.stores_for("all").len(), 11);
        assert!(registry.stores_for("beauty").iter().all(|s| s.is_category("Beauty")));
    }

    #[test]
    fn builtin_walmart_carries_filters_and_alternates() {
        let registry = StoreRegistry::builtin().unwrap();
        let walmart = registry.find_store("walmart").unwrap();
        let filters = walmart.filters.as_ref().unwrap();
        assert_eq!(filters.min_discount, Some(30));
        assert!(filters.keywords.iter().any(|k| k == "serum"));
        assert_eq!(walmart.alternate_urls.len(), 2);
        assert_eq!(walmart.max_products, Some(10));
    }

    #[test]
    fn all_unions_categories_in_order() {
        let registry = StoreRegistry::from_yaml_str(MINIMAL).unwrap();
        let names: Vec<_> = registry.stores_for("ALL").iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert_eq!(registry.stores_for("Beauty").len(), 1);
        assert!(registry.stores_for("toys").is_empty());
        assert!(registry.has_category("all"));
        assert!(!registry.has_category("toys"));
    }

    #[test]
    fn finds_store_by_name() {
        let registry = StoreRegistry::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(registry.find_store(" beta ").unwrap().name, "Beta");
        assert!(registry.find_store("gamma").is_none());
    }

    #[test]
    fn missing_required_selector_fails_fast() {
        let yaml = MINIMAL.replace("          link: a\n  - name: beauty", "          link: []\n  - name: beauty");
        let err = StoreRegistry::from_yaml_str(&yaml).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidStore { store, reason } if store == "Alpha" && reason.contains("link")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn absent_required_selector_is_a_parse_error() {
        let yaml = MINIMAL.replace("          current_price: .price\n", "");
        assert!(matches!(
            StoreRegistry::from_yaml_str(&yaml),
            Err(ConfigError::CatalogParse(_))
        ));
    }

    #[test]
    fn bad_css_selector_is_rejected_at_load() {
        let yaml = MINIMAL.replace("title: .title", "title: \"div[\"");
        assert!(matches!(
            StoreRegistry::from_yaml_str(&yaml),
            Err(ConfigError::CatalogParse(_))
        ));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let yaml = MINIMAL.replace("https://alpha.test/sale", "/sale");
        assert!(matches!(
            StoreRegistry::from_yaml_str(&yaml),
            Err(ConfigError::InvalidStore { .. })
        ));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let yaml = MINIMAL.replace(
            "        url_prefix: https://alpha.test\n",
            "        url_prefix: https://alpha.test\n        pagination:\n          mode: offset\n          param: offset\n          page_size: 0\n",
        );
        let err = StoreRegistry::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("page_size"), "{err}");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let yaml = MINIMAL.replace("name: Beta", "name: alpha");
        assert!(matches!(
            StoreRegistry::from_yaml_str(&yaml),
            Err(ConfigError::DuplicateStore(name)) if name == "alpha"
        ));
    }

    #[test]
    fn bad_header_is_rejected_at_load() {
        let yaml = MINIMAL.replace(
            "        url_prefix: https://alpha.test\n",
            "        url_prefix: https://alpha.test\n        headers:\n          \"Bad Header\": x\n",
        );
        assert!(StoreRegistry::from_yaml_str(&yaml).is_err());
    }
}
