//! Traits and interfaces for website-agnostic scraping

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::extract::{LinkChain, SelectorChain};
use crate::fetch::FetchOutcome;

/// Configuration for one store's listing pages
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Display name for the store, copied onto every deal
    pub name: String,
    /// Listing URL for the first page
    pub base_url: String,
    /// Further listing URLs, tried in order while earlier ones yield nothing
    #[serde(default)]
    pub alternate_urls: Vec<String>,
    /// How page N of a listing is addressed
    #[serde(default)]
    pub pagination: Pagination,
    /// CSS selector chains for extracting data
    pub selectors: SiteSelectors,
    /// Prefix joined onto relative product links
    #[serde(default)]
    pub url_prefix: String,
    /// Category tag copied onto every deal (e.g. "Beauty")
    #[serde(default)]
    pub category: Option<String>,
    /// Post-extraction filters specific to this store
    #[serde(default)]
    pub filters: Option<StoreFilters>,
    /// Header overrides merged over the fetcher defaults
    #[serde(default)]
    pub headers: StoreHeaders,
    /// Per-page product cap, never above the global cap
    #[serde(default)]
    pub max_products: Option<usize>,
}

/// Selector fallback chains for the parts of a product listing
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSelectors {
    /// Container for individual products
    pub container: SelectorChain,
    /// Title/name within the product container
    pub title: SelectorChain,
    /// Current (sale) price within the product container
    pub current_price: SelectorChain,
    /// Original price; may be empty, in which case original = current
    #[serde(default)]
    pub original_price: SelectorChain,
    /// Product link sources within the product container
    pub link: LinkChain,
}

/// Page addressing scheme for multi-page listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Pagination {
    /// Single listing page
    #[default]
    None,
    /// `param = page + offset`
    PageNumber {
        param: String,
        #[serde(default)]
        offset: i64,
        /// Page 1 is requested as the bare base URL
        #[serde(default)]
        omit_first_page: bool,
    },
    /// `param = (page - 1) * page_size`
    Offset { param: String, page_size: u32 },
}

/// Light filters applied right after extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoreFilters {
    /// Deals below this discount are dropped
    #[serde(default)]
    pub min_discount: Option<u32>,
    /// At least one of these must appear in the title (case-insensitive)
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Custom request headers, validated when the catalog loads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>")]
pub struct StoreHeaders(HeaderMap);

impl TryFrom<BTreeMap<String, String>> for StoreHeaders {
    type Error = String;

    fn try_from(raw: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in raw {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name \"{name}\": {e}"))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|e| format!("invalid value for header \"{name}\": {e}"))?;
            headers.insert(header_name, header_value);
        }
        Ok(Self(headers))
    }
}

impl StoreHeaders {
    #[must_use]
    pub fn as_map(&self) -> &HeaderMap {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl StoreConfig {
    /// Number of pages actually requested for a run asking for `pages`.
    #[must_use]
    pub fn page_count(&self, pages: u32) -> u32 {
        match self.pagination {
            Pagination::None => 1,
            _ => pages.max(1),
        }
    }

    /// Builds the URL for `page` (1-based) of the listing at `listing_url`.
    #[must_use]
    pub fn build_page_url(&self, listing_url: &str, page: u32) -> String {
        let page = page.max(1);
        match &self.pagination {
            Pagination::None => listing_url.to_string(),
            Pagination::PageNumber {
                param,
                offset,
                omit_first_page,
            } => {
                if page == 1 && *omit_first_page {
                    return listing_url.to_string();
                }
                let value = i64::from(page) + offset;
                append_query(listing_url, param, &value.to_string())
            }
            Pagination::Offset { param, page_size } => {
                let value = u64::from(page - 1) * u64::from(*page_size);
                append_query(listing_url, param, &value.to_string())
            }
        }
    }

    /// Base URL followed by the alternates, in trial order.
    pub fn listing_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.base_url.as_str()).chain(self.alternate_urls.iter().map(String::as_str))
    }

    /// `true` when this store is tagged with `category` (case-insensitive).
    #[must_use]
    pub fn is_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(category))
    }
}

fn append_query(url: &str, param: &str, value: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = if base.contains('?') {
        if base.ends_with('?') || base.ends_with('&') { "" } else { "&" }
    } else {
        "?"
    };
    let param = urlencoding::encode(param);
    let mut built = format!("{base}{separator}{param}={value}");
    if let Some(fragment) = fragment {
        built.push('#');
        built.push_str(fragment);
    }
    built
}

/// Fetches one page and classifies the response
///
/// Implementations must never fail past this boundary for transport faults;
/// every problem is reported through [`FetchOutcome`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Issues a single GET for `url` with `headers` merged over the fetcher's
    /// defaults.
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> FetchOutcome;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> FetchOutcome {
        (**self).fetch(url, headers).await
    }
}
