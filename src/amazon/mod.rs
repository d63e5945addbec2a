//! Secondary-marketplace price lookup.
//!
//! The marketplace actively resists automated access, so every request gets
//! a randomized browser signature and a human-like pause first, and response
//! bodies are checked for the CAPTCHA interstitial before anything is parsed.

use std::sync::LazyLock;
use std::time::Duration;

use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, DNT, HeaderMap, HeaderValue, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use crate::discount::parse_price;
use crate::error::FetchError;
use crate::extract::{SelectorChain, element_text, first_match, first_text, matching_containers};
use crate::fetch::{FetchOutcome, HttpFetcher};
use crate::models::{AmazonSearchResult, BatchLookup, BlockReason, Deal, LookupOutcome};
use crate::pacing::LookupPacing;
use crate::resale::estimate_profit;
use crate::traits::PageFetcher;

pub const DEFAULT_BASE_URL: &str = "https://www.amazon.com";

/// Substring the marketplace serves on its CAPTCHA interstitial.
pub const CAPTCHA_MARKER: &str = "Enter the characters you see below";

/// Ranked results kept per search.
pub const MAX_RESULTS: usize = 5;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

static RESULT_CONTAINERS: LazyLock<SelectorChain> = LazyLock::new(|| {
    chain(&[
        "[data-component-type='s-search-result']",
        "div.s-result-item[data-asin]",
        "div[data-index]",
    ])
});

static RESULT_TITLE: LazyLock<SelectorChain> =
    LazyLock::new(|| chain(&["h2 a span", "h2 span", "a.s-link span"]));

static RESULT_PRICE: LazyLock<SelectorChain> = LazyLock::new(|| {
    chain(&[
        "span.a-price-whole",
        "span.a-price:not(.a-text-price) span",
        "span.a-price-range span.a-price-whole",
        "span.a-price span.a-offscreen",
    ])
});

static DEMOGRAPHIC_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:men's|women's|boys'|girls'|kids')(?:\s|$)")
        .expect("demographic pattern is valid")
});

fn chain(selectors: &[&str]) -> SelectorChain {
    SelectorChain::parse(selectors.iter().copied()).expect("built-in marketplace selectors are valid")
}

/// Headers every marketplace request carries, mimicking a browser navigation.
#[must_use]
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers
}

/// Per-request headers: a User-Agent drawn at random from the pool.
#[must_use]
pub fn randomized_headers() -> HeaderMap {
    let agent = USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(agent));
    headers
}

/// Reduces a product title to a search query: drops demographic qualifiers
/// and keeps at most the first four words.
#[must_use]
pub fn clean_search_query(product_name: &str) -> String {
    let stripped = DEMOGRAPHIC_WORDS.replace_all(product_name, " ");
    stripped
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a search result page.
///
/// The CAPTCHA check runs first: a challenge page is [`LookupOutcome::Blocked`]
/// even if it also contains product markup.
#[must_use]
pub fn parse_search_results(html: &str) -> LookupOutcome {
    if html.contains(CAPTCHA_MARKER) {
        warn!("CAPTCHA detected");
        return LookupOutcome::Blocked(BlockReason::Captcha);
    }

    let document = Html::parse_document(html);
    let products = matching_containers(&document, &RESULT_CONTAINERS);
    if products.is_empty() {
        debug!("No result containers matched");
        return LookupOutcome::NoResults;
    }
    debug!(count = products.len(), "Found result containers");

    let results: Vec<_> = products
        .into_iter()
        .take(MAX_RESULTS)
        .enumerate()
        .filter_map(|(index, product)| parse_result(product, index + 1))
        .collect();

    if results.is_empty() {
        LookupOutcome::NoResults
    } else {
        LookupOutcome::Found(results)
    }
}

fn parse_result(product: ElementRef<'_>, position: usize) -> Option<AmazonSearchResult> {
    let title = first_text(product, &RESULT_TITLE)?;
    let price = first_match(product, &RESULT_PRICE, |found| {
        parse_price(&element_text(found))
    })?;
    Some(AmazonSearchResult {
        title,
        price,
        position,
    })
}

/// Marketplace lookup settings
#[derive(Debug, Clone, PartialEq)]
pub struct LookupConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub pacing: LookupPacing,
    /// Searches per batch item, including the first
    pub max_attempts: u32,
    /// Deals checked per batch
    pub max_items: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            pacing: LookupPacing::default(),
            max_attempts: 3,
            max_items: 5,
        }
    }
}

/// Searches the marketplace for deal titles
pub struct MarketplaceLookup<F: PageFetcher> {
    fetcher: F,
    config: LookupConfig,
}

impl MarketplaceLookup<HttpFetcher> {
    /// Lookup over a cookie-keeping HTTP session.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn http(config: LookupConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::with_session(config.timeout, browser_headers())?;
        Ok(Self::new(fetcher, config))
    }
}

impl<F: PageFetcher> MarketplaceLookup<F> {
    pub fn new(fetcher: F, config: LookupConfig) -> Self {
        Self { fetcher, config }
    }

    #[must_use]
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// The search URL variants tried, in order, for one query.
    #[must_use]
    pub fn search_urls(&self, query: &str) -> [String; 2] {
        let base = self.config.base_url.trim_end_matches('/');
        let encoded = urlencoding::encode(query);
        [
            format!("{base}/s?k={encoded}"),
            format!("{base}/s?k={encoded}&ref=nb_sb_noss"),
        ]
    }

    /// Looks up one product title.
    ///
    /// Tries each URL variant until one returns a page. Rate-limit responses
    /// and failures move on to the next variant; if none returns a page the
    /// last rate limit (or failure) is reported. A title with no searchable
    /// words is [`LookupOutcome::NoResults`] without a request.
    pub async fn search(&self, product_name: &str) -> LookupOutcome {
        let query = clean_search_query(product_name);
        if query.is_empty() {
            // nothing left to search for; retrying cannot change that
            warn!("\"{}\" has no searchable words", product_name);
            return LookupOutcome::NoResults;
        }
        info!("Searching marketplace for: {}", query);

        let mut rate_limited = None;
        let mut last_failure = String::from("no search attempted");

        for (attempt, url) in self.search_urls(&query).iter().enumerate() {
            self.config.pacing.human.pause().await;
            debug!(attempt = attempt + 1, url = %url, "Marketplace request");

            match self.fetcher.fetch(url, &randomized_headers()).await {
                FetchOutcome::Success { body } => return parse_search_results(&body),
                FetchOutcome::SoftBlock { status } => {
                    warn!(status, "Marketplace pushed back, trying next variant");
                    rate_limited = Some(status);
                }
                FetchOutcome::HardError(reason) => {
                    warn!(%reason, "Marketplace request failed");
                    last_failure = reason.to_string();
                }
            }
        }

        match rate_limited {
            Some(status) => LookupOutcome::Blocked(BlockReason::RateLimited { status }),
            None => LookupOutcome::Failed(last_failure),
        }
    }

    /// Checks the first `max_items` deals one at a time.
    ///
    /// Each item is retried after failures and rate limits, waiting longer
    /// on every retry. A CAPTCHA or an empty result page ends the item. Items
    /// are separated by the item pacing delay.
    pub async fn batch_check(&self, deals: &[Deal]) -> Vec<BatchLookup> {
        let batch = &deals[..deals.len().min(self.config.max_items)];
        let max_attempts = self.config.max_attempts.max(1);
        let mut checked = Vec::with_capacity(batch.len());

        for (index, deal) in batch.iter().enumerate() {
            info!("[{}/{}] Checking: {}", index + 1, batch.len(), deal.title);

            let mut attempts = 0;
            let outcome = loop {
                attempts += 1;
                let outcome = self.search(&deal.title).await;
                let retryable = matches!(
                    outcome,
                    LookupOutcome::Failed(_) | LookupOutcome::Blocked(BlockReason::RateLimited { .. })
                );
                if !retryable || attempts >= max_attempts {
                    break outcome;
                }
                warn!("Attempt {} for \"{}\" failed, retrying", attempts, deal.title);
                self.config.pacing.retry.pause_scaled(attempts).await;
            };

            let profit = outcome
                .results()
                .and_then(|results| estimate_profit(deal, results));
            match &profit {
                Some(analysis) => info!(
                    "Net profit for {}: ${:.2} ({})",
                    deal.title,
                    analysis.net_profit,
                    if analysis.profitable { "profitable" } else { "not profitable" }
                ),
                None => info!("No price comparison for {}", deal.title),
            }

            checked.push(BatchLookup {
                deal: deal.clone(),
                outcome,
                attempts,
                profit,
            });

            if index + 1 < batch.len() {
                self.config.pacing.item.pause().await;
            }
        }

        info!("Batch check complete. Processed {} deals", checked.len());
        checked
    }
}
