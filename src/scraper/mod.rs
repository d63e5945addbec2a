//! Generic store scraper driven entirely by a [`StoreConfig`].
//!
//! One pass walks the store's listing URLs and pages in order, fetching each
//! page, extracting every product container, and keeping the products that
//! resolve to a complete deal. Nothing here aborts the pass: fetch failures
//! contribute zero deals for their page and a bad product is skipped.

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use crate::discount::calculate_discount;
use crate::error::ExtractionMiss;
use crate::extract::{extract_url, first_text, matching_containers};
use crate::fetch::FetchOutcome;
use crate::models::{Deal, Diagnostics, StoreReport, captured_now};
use crate::pacing::DelayRange;
use crate::traits::{PageFetcher, StoreConfig};

/// Hard cap on product containers read from a single page.
pub const MAX_PRODUCTS_PER_PAGE: usize = 50;

/// Deals and bookkeeping from one store pass
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub deals: Vec<Deal>,
    pub report: StoreReport,
}

/// Scrapes one store; borrows its configuration for the duration of a pass
pub struct StoreScraper<'a, F: PageFetcher + ?Sized> {
    config: &'a StoreConfig,
    fetcher: &'a F,
    page_delay: DelayRange,
}

impl<'a, F: PageFetcher + ?Sized> StoreScraper<'a, F> {
    #[must_use]
    pub fn new(config: &'a StoreConfig, fetcher: &'a F, page_delay: DelayRange) -> Self {
        Self {
            config,
            fetcher,
            page_delay,
        }
    }

    /// Scrapes up to `pages` pages of the store's listing.
    ///
    /// Alternate listing URLs are only tried while earlier ones have produced
    /// no deals.
    pub async fn scrape(&self, pages: u32) -> StoreOutcome {
        let config = self.config;
        let page_count = config.page_count(pages);
        let mut report = StoreReport::new(&config.name);
        let mut deals = Vec::new();
        let mut seen_urls = HashSet::new();
        let mut requests = 0usize;

        info!("Scraping {} ({} page(s))", config.name, page_count);

        for listing_url in config.listing_urls() {
            for page in 1..=page_count {
                if requests > 0 {
                    self.page_delay.pause().await;
                }
                requests += 1;

                let url = config.build_page_url(listing_url, page);
                report.pages_attempted += 1;
                debug!(store = %config.name, page, url = %url, "Fetching page");

                let headers = config.headers.as_map();
                let body = match self.fetcher.fetch(&url, headers).await {
                    FetchOutcome::Success { body } => body,
                    FetchOutcome::SoftBlock { status } => {
                        warn!(store = %config.name, page, status, "Soft-blocked, skipping page");
                        report.pages_soft_blocked += 1;
                        report.diagnostics.soft_blocks += 1;
                        continue;
                    }
                    FetchOutcome::HardError(reason) => {
                        warn!(store = %config.name, page, %reason, "Page fetch failed");
                        report.pages_failed += 1;
                        report.diagnostics.hard_errors += 1;
                        continue;
                    }
                };
                report.pages_ok += 1;

                // Html is not Send; keep it inside a synchronous call
                let page_deals = self.extract_page(&body, &mut report.diagnostics);
                debug!(store = %config.name, page, found = page_deals.len(), "Extracted page");

                for deal in page_deals {
                    if seen_urls.insert(deal.url.clone()) {
                        deals.push(deal);
                    } else {
                        report.diagnostics.duplicates += 1;
                    }
                }
            }

            if !deals.is_empty() {
                break;
            }
        }

        report.deals = deals.len();
        info!("Found {} deals on {}", deals.len(), config.name);
        StoreOutcome { deals, report }
    }

    /// Extracts and filters every product on one listing page.
    pub fn extract_page(&self, html: &str, diagnostics: &mut Diagnostics) -> Vec<Deal> {
        let document = Html::parse_document(html);
        let containers = matching_containers(&document, &self.config.selectors.container);

        if containers.is_empty() {
            debug!(store = %self.config.name, "No product containers matched");
            diagnostics.empty_pages += 1;
            return Vec::new();
        }

        let cap = self
            .config
            .max_products
            .map_or(MAX_PRODUCTS_PER_PAGE, |max| max.min(MAX_PRODUCTS_PER_PAGE));

        let mut deals = Vec::new();
        for product in containers.into_iter().take(cap) {
            let deal = match self.extract_product(product) {
                Ok(deal) => deal,
                Err(miss) => {
                    debug!(store = %self.config.name, %miss, "Skipping product");
                    diagnostics.record_miss(miss);
                    continue;
                }
            };

            if let Some(filters) = &self.config.filters
                && !filters.accepts(&deal)
            {
                diagnostics.filtered_out += 1;
                continue;
            }

            deals.push(deal);
        }
        deals
    }

    /// Builds a deal from one product container.
    ///
    /// # Errors
    ///
    /// Returns the first required field that could not be extracted.
    pub fn extract_product(&self, product: ElementRef<'_>) -> Result<Deal, ExtractionMiss> {
        let selectors = &self.config.selectors;

        let title = first_text(product, &selectors.title).ok_or(ExtractionMiss::Title)?;
        let current_price =
            first_text(product, &selectors.current_price).ok_or(ExtractionMiss::CurrentPrice)?;
        let url = extract_url(product, &selectors.link, &self.config.url_prefix)
            .ok_or(ExtractionMiss::Url)?;
        let original_price =
            first_text(product, &selectors.original_price).unwrap_or_else(|| current_price.clone());

        let discount_pct = calculate_discount(&original_price, &current_price);

        Ok(Deal {
            id: Deal::fingerprint(&self.config.name, &url),
            store: self.config.name.clone(),
            title,
            current_price,
            original_price,
            discount_pct,
            url,
            category: self.config.category.clone(),
            date_found: captured_now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::HardError;
    use crate::registry::StoreRegistry;
    use crate::testing::{CannedFetcher, card, listing};

    const CATALOG: &str = r#"
categories:
  - name: sportswear
    stores:
      - name: Shoes
        base_url: https://shoes.test/sale
        pagination:
          mode: page-number
          param: page
        url_prefix: https://shoes.test
        selectors:
          container: [".missing", ".card"]
          title: [".name", ".title"]
          current_price: .now
          original_price: .was
          link: a.link
      - name: Relative
        base_url: https://relative.test/sale
        selectors:
          container: .card
          title: .title
          current_price: .now
          link: a.link
  - name: beauty
    stores:
      - name: Glow
        base_url: https://glow.test/a
        alternate_urls: [https://glow.test/b, https://glow.test/c]
        url_prefix: https://glow.test
        category: Beauty
        max_products: 2
        selectors:
          container: .card
          title: .title
          current_price: .now
          original_price: .was
          link: a.link
        filters:
          min_discount: 30
          keywords: [serum]
"#;

    fn registry() -> StoreRegistry {
        StoreRegistry::from_yaml_str(CATALOG).unwrap()
    }

    #[tokio::test]
    async fn extracts_normalized_deals() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let fetcher = CannedFetcher::new().page(
            "https://shoes.test/sale?page=1",
            &listing(&[
                card("Air Max", "$79.99", Some("$120.00"), "/p/air-max"),
                card("Samba", "$90.00", None, "https://shoes.test/p/samba"),
            ]),
        );

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(1).await;

        assert_eq!(outcome.deals.len(), 2);
        let air = &outcome.deals[0];
        assert_eq!(air.store, "Shoes");
        assert_eq!(air.title, "Air Max");
        assert_eq!(air.url, "https://shoes.test/p/air-max");
        assert_eq!(air.original_price, "$120.00");
        assert_eq!(air.discount_pct, 33);
        assert_eq!(air.category, None);

        let samba = &outcome.deals[1];
        assert_eq!(samba.original_price, "$90.00");
        assert_eq!(samba.discount_pct, 0);
        assert!(outcome.deals.iter().all(Deal::is_valid));
    }

    #[tokio::test]
    async fn relative_only_link_yields_no_deals() {
        let registry = registry();
        let store = registry.find_store("Relative").unwrap();
        let fetcher = CannedFetcher::new().page(
            "https://relative.test/sale",
            &listing(&[card("Widget", "$10.00", Some("$20.00"), "/p/widget")]),
        );

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(1).await;

        assert!(outcome.deals.is_empty());
        assert_eq!(outcome.report.diagnostics.missing_url, 1);
        assert_eq!(outcome.report.pages_ok, 1);
    }

    #[tokio::test]
    async fn bad_products_are_skipped_not_fatal() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let html = format!(
            r#"<html><body>
            <div class="card"><span class="now">$5.00</span><a class="link" href="/p/no-title">x</a></div>
            <div class="card"><h3 class="title">No price</h3><a class="link" href="/p/no-price">x</a></div>
            <div class="card"><h3 class="title">No link</h3><span class="now">$5.00</span></div>
            {}
            </body></html>"#,
            card("Good", "$5.00", Some("$10.00"), "/p/good")
        );
        let fetcher = CannedFetcher::new().page("https://shoes.test/sale?page=1", &html);

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(1).await;

        assert_eq!(outcome.deals.len(), 1);
        assert_eq!(outcome.deals[0].title, "Good");
        let diag = outcome.report.diagnostics;
        assert_eq!(diag.missing_title, 1);
        assert_eq!(diag.missing_price, 1);
        assert_eq!(diag.missing_url, 1);
    }

    #[tokio::test]
    async fn failing_page_does_not_stop_later_pages() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let fetcher = CannedFetcher::new()
            .outcome(
                "https://shoes.test/sale?page=1",
                FetchOutcome::HardError(HardError::Transport("connection reset".to_string())),
            )
            .outcome(
                "https://shoes.test/sale?page=2",
                FetchOutcome::SoftBlock { status: 503 },
            )
            .page(
                "https://shoes.test/sale?page=3",
                &listing(&[card("Kept", "$1.00", Some("$2.00"), "/p/kept")]),
            );

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(3).await;

        assert_eq!(outcome.deals.len(), 1);
        assert_eq!(outcome.report.pages_attempted, 3);
        assert_eq!(outcome.report.pages_failed, 1);
        assert_eq!(outcome.report.pages_soft_blocked, 1);
        assert_eq!(outcome.report.pages_ok, 1);
        assert!(!outcome.report.failed_outright());
        assert_eq!(
            fetcher.requested(),
            vec![
                "https://shoes.test/sale?page=1",
                "https://shoes.test/sale?page=2",
                "https://shoes.test/sale?page=3",
            ]
        );
    }

    #[tokio::test]
    async fn every_page_failing_is_an_empty_store() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let fetcher = CannedFetcher::new();

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(2).await;

        assert!(outcome.deals.is_empty());
        assert!(outcome.report.failed_outright());
        assert_eq!(outcome.report.diagnostics.hard_errors, 2);
    }

    #[tokio::test]
    async fn page_without_containers_is_empty_not_failed() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let fetcher = CannedFetcher::new().page(
            "https://shoes.test/sale?page=1",
            "<html><body><p>Access denied</p></body></html>",
        );

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(1).await;

        assert!(outcome.deals.is_empty());
        assert!(!outcome.report.failed_outright());
        assert_eq!(outcome.report.diagnostics.empty_pages, 1);
    }

    #[tokio::test]
    async fn caps_products_per_page() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let cards: Vec<String> = (0..60)
            .map(|i| card(&format!("Shoe {i}"), "$5.00", Some("$10.00"), &format!("/p/{i}")))
            .collect();
        let fetcher = CannedFetcher::new().page("https://shoes.test/sale?page=1", &listing(&cards));

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(1).await;

        assert_eq!(outcome.deals.len(), MAX_PRODUCTS_PER_PAGE);
    }

    #[tokio::test]
    async fn duplicate_urls_are_kept_once() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let page = listing(&[card("Repeat", "$5.00", Some("$10.00"), "/p/repeat")]);
        let fetcher = CannedFetcher::new()
            .page("https://shoes.test/sale?page=1", &page)
            .page("https://shoes.test/sale?page=2", &page);

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(2).await;

        assert_eq!(outcome.deals.len(), 1);
        assert_eq!(outcome.report.diagnostics.duplicates, 1);
    }

    #[test]
    fn finish_line_link_comes_from_the_product_json() {
        let registry = StoreRegistry::builtin().unwrap();
        let store = registry.find_store("Finish Line").unwrap();
        let fetcher = CannedFetcher::new();
        let scraper = StoreScraper::new(store, &fetcher, DelayRange::ZERO);
        let html = r#"<html><body>
            <div data-product='{"url":"/product/air-max-90/123"}'>
                <div class="product-name"><a>Nike Air Max 90</a></div>
                <div class="product-price"><span class="price-sale">$89.99</span><span class="price-regular">$130.00</span></div>
            </div>
            <div data-product="{}">
                <div class="product-name"><a href="/product/samba/456">Adidas Samba</a></div>
                <div class="product-price"><span class="price">$70.00</span></div>
            </div>
        </body></html>"#;

        let mut diagnostics = Diagnostics::default();
        let deals = scraper.extract_page(html, &mut diagnostics);

        let urls: Vec<_> = deals.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.finishline.com/product/air-max-90/123",
                "https://www.finishline.com/product/samba/456",
            ]
        );
        assert_eq!(deals[0].discount_pct, 31);
        assert_eq!(diagnostics.missing_url, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pages_are_separated_by_the_page_delay() {
        let registry = registry();
        let store = registry.find_store("Shoes").unwrap();
        let fetcher = CannedFetcher::new();
        let delay = DelayRange::from_millis(1500, 1500).unwrap();

        let started = tokio::time::Instant::now();
        StoreScraper::new(store, &fetcher, delay).scrape(1).await;
        assert_eq!(started.elapsed(), Duration::ZERO);

        let started = tokio::time::Instant::now();
        StoreScraper::new(store, &fetcher, delay).scrape(3).await;
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4),
            "two page delays expected, waited {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn store_filters_and_alternate_urls() {
        let registry = registry();
        let store = registry.find_store("Glow").unwrap();
        let fetcher = CannedFetcher::new()
            .page(
                "https://glow.test/a",
                &listing(&[card("Lip Gloss", "$5.00", Some("$20.00"), "/p/gloss")]),
            )
            .page(
                "https://glow.test/b",
                &listing(&[
                    card("Vitamin C Serum", "$5.00", Some("$20.00"), "/p/serum"),
                    card("Retinol Serum", "$18.00", Some("$20.00"), "/p/retinol"),
                    card("Night Serum", "$2.00", Some("$20.00"), "/p/night"),
                ]),
            )
            .page(
                "https://glow.test/c",
                &listing(&[card("Never Fetched Serum", "$1.00", Some("$20.00"), "/p/never")]),
            );

        let outcome = StoreScraper::new(store, &fetcher, DelayRange::ZERO).scrape(3).await;

        // max_products: 2 means "Night Serum" is never read
        let titles: Vec<_> = outcome.deals.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Vitamin C Serum"]);
        assert_eq!(outcome.deals[0].category.as_deref(), Some("Beauty"));
        assert_eq!(outcome.report.diagnostics.filtered_out, 2);
        assert_eq!(
            fetcher.requested(),
            vec!["https://glow.test/a", "https://glow.test/b"]
        );
    }
}
