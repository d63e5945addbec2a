use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::filters::HighValueFilter;
use crate::models::{Deal, Diagnostics, Progress, ScrapeReport};
use crate::normalize::clean_title;
use crate::pacing::Pacing;
use crate::registry::StoreRegistry;
use crate::scraper::{StoreOutcome, StoreScraper};
use crate::traits::PageFetcher;

/// Receives progress updates from a running scrape.
///
/// Called on the scraping task itself, so implementations should return
/// quickly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress);
    }
}

/// What to scrape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    /// `"all"`, a catalog category, or anything else (which matches no stores)
    pub category: String,
    /// Pages per multi-page store
    pub pages: u32,
    /// Strip listing noise from titles after filtering
    pub clean_titles: bool,
}

impl ScrapeRequest {
    #[must_use]
    pub fn new(category: &str, pages: u32) -> Self {
        Self {
            category: category.to_string(),
            pages: pages.max(1),
            clean_titles: true,
        }
    }
}

/// Runs store scrapers across a category and aggregates their deals
#[derive(Clone)]
pub struct DealFinder<F: PageFetcher> {
    registry: Arc<StoreRegistry>,
    fetcher: F,
    pacing: Pacing,
}

impl<F: PageFetcher> DealFinder<F> {
    pub fn new(registry: Arc<StoreRegistry>, fetcher: F, pacing: Pacing) -> Self {
        Self {
            registry,
            fetcher,
            pacing,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Scrapes every store in the requested category, one after another.
    ///
    /// Never fails: stores that fault contribute zero deals and show up in
    /// the report's failure counts.
    pub async fn run(
        &self,
        request: &ScrapeRequest,
        progress: Option<&dyn ProgressSink>,
    ) -> ScrapeReport {
        let started_at = Utc::now();
        let stores = self.registry.stores_for(&request.category);
        let total = stores.len();

        if total == 0 {
            warn!("No stores configured for category \"{}\"", request.category);
        } else {
            info!(
                "Starting scrape of {} store(s) for category \"{}\"",
                total, request.category
            );
        }

        let mut deals = Vec::new();
        let mut store_reports = Vec::with_capacity(total);
        let mut diagnostics = Diagnostics::default();

        for (index, store) in stores.iter().enumerate() {
            if index > 0 {
                self.pacing.store.pause().await;
            }

            notify(
                progress,
                Progress {
                    current: index,
                    total,
                    store: store.name.clone(),
                    category: request.category.clone(),
                },
            );

            let scraper = StoreScraper::new(store, &self.fetcher, self.pacing.page);
            let mut outcome = scraper.scrape(request.pages).await;
            drop_invalid(&mut outcome);

            if outcome.report.failed_outright() {
                warn!(
                    "{} failed: all {} page(s) faulted",
                    store.name, outcome.report.pages_attempted
                );
            } else {
                info!("Found {} deals from {}", outcome.deals.len(), store.name);
            }

            diagnostics.merge(&outcome.report.diagnostics);
            deals.extend(outcome.deals);
            store_reports.push(outcome.report);
        }

        notify(
            progress,
            Progress {
                current: total,
                total,
                store: Progress::COMPLETE.to_string(),
                category: request.category.clone(),
            },
        );

        let deals_before_filter = deals.len();
        if let Some(filter) = HighValueFilter::for_category(&request.category) {
            deals = filter.apply(deals);
            info!(
                "High-value filter kept {} of {} deals",
                deals.len(),
                deals_before_filter
            );
        }

        if request.clean_titles {
            for deal in &mut deals {
                deal.title = clean_title(&deal.title);
            }
        }

        let failed_stores = store_reports.iter().filter(|r| r.failed_outright()).count();
        let failed_pages = store_reports
            .iter()
            .map(|r| r.pages_failed + r.pages_soft_blocked)
            .sum();

        info!(
            "Total deals found: {} ({} store(s) had issues)",
            deals.len(),
            failed_stores
        );

        ScrapeReport {
            category: request.category.clone(),
            deals,
            stores: store_reports,
            failed_stores,
            failed_pages,
            deals_before_filter,
            diagnostics,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl<F: PageFetcher> DealFinder<F> {
    /// Scrapes a single store by name, bypassing categories and the
    /// category-wide filter. Returns `None` for an unknown store.
    pub async fn scrape_store(&self, name: &str, pages: u32) -> Option<StoreOutcome> {
        let store = self.registry.find_store(name)?;
        let scraper = StoreScraper::new(store, &self.fetcher, self.pacing.page);
        let mut outcome = scraper.scrape(pages.max(1)).await;
        drop_invalid(&mut outcome);
        Some(outcome)
    }
}

/// Removes deals that break the emitted-deal invariant, counting them.
fn drop_invalid(outcome: &mut StoreOutcome) {
    let before = outcome.deals.len();
    outcome.deals.retain(Deal::is_valid);
    let dropped = before - outcome.deals.len();
    if dropped > 0 {
        warn!(
            "Dropped {} invalid deal(s) from {}",
            dropped, outcome.report.store
        );
        outcome.report.diagnostics.invalid_dropped += dropped;
        outcome.report.deals = outcome.deals.len();
    }
}

fn notify(sink: Option<&dyn ProgressSink>, progress: Progress) {
    if let Some(sink) = sink {
        sink.on_progress(&progress);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::fetch::FetchOutcome;
    use crate::models::{StoreReport, captured_now};
    use crate::pacing::DelayRange;
    use crate::testing::{CannedFetcher, card, listing};

    const CATALOG: &str = r#"
categories:
  - name: sportswear
    stores:
      - name: One
        base_url: https://one.test/sale
        url_prefix: https://one.test
        selectors: &layout
          container: .card
          title: .title
          current_price: .now
          original_price: .was
          link: a.link
      - name: Two
        base_url: https://two.test/sale
        url_prefix: https://two.test
        selectors: *layout
      - name: Three
        base_url: https://three.test/sale
        url_prefix: https://three.test
        selectors: *layout
  - name: beauty
    stores:
      - name: Glow
        base_url: https://glow.test/sale
        url_prefix: https://glow.test
        category: Beauty
        selectors: *layout
"#;

    fn finder(fetcher: CannedFetcher) -> DealFinder<CannedFetcher> {
        let registry = StoreRegistry::from_yaml_str(CATALOG).unwrap();
        DealFinder::new(Arc::new(registry), fetcher, Pacing::none())
    }

    fn sportswear_fetcher() -> CannedFetcher {
        CannedFetcher::new()
            .page(
                "https://one.test/sale",
                &listing(&[
                    card("Runner", "$50.00", Some("$100.00"), "/p/1"),
                    card("Trainer", "$60.00", Some("$80.00"), "/p/2"),
                ]),
            )
            .outcome("https://two.test/sale", FetchOutcome::SoftBlock { status: 429 })
            .page(
                "https://three.test/sale",
                &listing(&[card("Slide", "$10.00", None, "/p/3")]),
            )
    }

    #[tokio::test]
    async fn failed_store_contributes_nothing_and_run_continues() {
        let finder = finder(sportswear_fetcher());

        let report = finder.run(&ScrapeRequest::new("sportswear", 1), None).await;

        assert_eq!(report.deals.len(), 3);
        assert_eq!(report.failed_stores, 1);
        assert_eq!(report.failed_pages, 1);
        assert_eq!(report.stores.len(), 3);
        assert!(report.stores[1].failed_outright());
        let stores: Vec<_> = report.deals.iter().map(|d| d.store.as_str()).collect();
        assert_eq!(stores, vec!["One", "One", "Three"]);
    }

    #[tokio::test]
    async fn progress_is_reported_once_per_store_plus_completion() {
        let finder = finder(sportswear_fetcher());
        let seen = Mutex::new(Vec::new());
        let sink = |p: &Progress| seen.lock().unwrap().push(p.clone());

        finder
            .run(&ScrapeRequest::new("sportswear", 1), Some(&sink))
            .await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].store, "One");
        assert_eq!((seen[0].current, seen[0].total), (0, 3));
        assert_eq!(seen[2].store, "Three");
        assert!(seen[3].is_complete());
        assert_eq!(seen[3].category, "sportswear");
    }

    #[tokio::test]
    async fn unknown_category_completes_empty() {
        let finder = finder(CannedFetcher::new());
        let calls = Mutex::new(0);
        let sink = |_: &Progress| *calls.lock().unwrap() += 1;

        let report = finder.run(&ScrapeRequest::new("toys", 1), Some(&sink)).await;

        assert!(report.deals.is_empty());
        assert_eq!(report.failed_stores, 0);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn beauty_applies_the_category_filter() {
        let fetcher = CannedFetcher::new().page(
            "https://glow.test/sale",
            &listing(&[
                card("Vitamin C Serum", "$20.00", Some("$40.00"), "/p/1"),
                card("Lip Balm", "$5.00", Some("$30.00"), "/p/2"),
                card("Eyeshadow Palette", "$15.00", Some("$25.00"), "/p/3"),
                card("Mini Mascara", "$5.00", Some("$15.00"), "/p/4"),
            ]),
        );
        let finder = finder(fetcher);

        let report = finder.run(&ScrapeRequest::new("beauty", 1), None).await;

        assert_eq!(report.deals_before_filter, 4);
        let titles: Vec<_> = report.deals.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Vitamin C Serum", "Eyeshadow Palette"]);
    }

    #[tokio::test]
    async fn all_category_skips_the_beauty_filter() {
        let fetcher = sportswear_fetcher().page(
            "https://glow.test/sale",
            &listing(&[card("Lip Balm", "$5.00", Some("$6.00"), "/p/2")]),
        );
        let finder = finder(fetcher);

        let report = finder.run(&ScrapeRequest::new("all", 1), None).await;

        assert_eq!(report.deals.len(), 4);
        assert_eq!(report.deals.last().unwrap().category.as_deref(), Some("Beauty"));
    }

    #[tokio::test]
    async fn single_store_by_name() {
        let finder = finder(sportswear_fetcher());

        let outcome = finder.scrape_store("three", 1).await.unwrap();
        assert_eq!(outcome.deals.len(), 1);
        assert_eq!(outcome.deals[0].title, "Slide");
        assert!(finder.scrape_store("Nope", 1).await.is_none());
    }

    #[test]
    fn invalid_deals_are_dropped_and_counted() {
        let mut report = StoreReport::new("One");
        report.deals = 2;
        let good = Deal {
            id: Deal::fingerprint("One", "https://one.test/p/1"),
            store: "One".to_string(),
            title: "Runner".to_string(),
            current_price: "$50.00".to_string(),
            original_price: "$100.00".to_string(),
            discount_pct: 50,
            url: "https://one.test/p/1".to_string(),
            category: None,
            date_found: captured_now(),
        };
        let blank_title = Deal {
            title: "   ".to_string(),
            url: "https://one.test/p/2".to_string(),
            ..good.clone()
        };
        let mut outcome = StoreOutcome {
            deals: vec![good, blank_title],
            report,
        };

        drop_invalid(&mut outcome);

        assert_eq!(outcome.deals.len(), 1);
        assert_eq!(outcome.report.deals, 1);
        assert_eq!(outcome.report.diagnostics.invalid_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stores_are_separated_by_the_store_delay() {
        let registry = StoreRegistry::from_yaml_str(CATALOG).unwrap();
        let pacing = Pacing {
            page: DelayRange::from_millis(1000, 1000).unwrap(),
            store: DelayRange::from_millis(4000, 4000).unwrap(),
        };
        let finder = DealFinder::new(Arc::new(registry), sportswear_fetcher(), pacing);

        let started = tokio::time::Instant::now();
        finder.run(&ScrapeRequest::new("sportswear", 1), None).await;
        let elapsed = started.elapsed();

        // three single-page stores: two store delays, no page delays
        assert!(
            elapsed >= Duration::from_secs(8) && elapsed < Duration::from_secs(9),
            "two store delays expected, waited {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn titles_are_cleaned_after_filtering() {
        let fetcher = CannedFetcher::new().page(
            "https://one.test/sale",
            &listing(&[card(
                "Runner Men's Black 132 reviews",
                "$50.00",
                Some("$100.00"),
                "/p/1",
            )]),
        );
        let finder = finder(fetcher);

        let report = finder.run(&ScrapeRequest::new("sportswear", 1), None).await;

        assert_eq!(report.deals[0].title, "Runner Men's");
    }
}
